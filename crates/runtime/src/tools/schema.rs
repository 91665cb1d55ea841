//! Collection schemas for the structured record store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ToolError;

/// Fields managed by the store itself; never writable through the tools
pub const SYSTEM_FIELDS: &[&str] = &["id", "collection", "created_at", "updated_at"];

/// Shape and validation rules of one named collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    /// Phrases in user queries that refer to this collection
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Every known field, used to validate group-by and filter names
    pub fields: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub immutable_fields: Vec<String>,
    #[serde(default)]
    pub numeric_fields: Vec<String>,
    /// Values applied on create when the caller omits the field
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl CollectionSchema {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            fields: strings(fields),
            required_fields: Vec::new(),
            immutable_fields: Vec::new(),
            numeric_fields: Vec::new(),
            defaults: Map::new(),
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = strings(aliases);
        self
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required_fields = strings(fields);
        self
    }

    pub fn immutable(mut self, fields: &[&str]) -> Self {
        self.immutable_fields = strings(fields);
        self
    }

    pub fn numeric(mut self, fields: &[&str]) -> Self {
        self.numeric_fields = strings(fields);
        self
    }

    pub fn default_value(mut self, field: &str, value: Value) -> Self {
        self.defaults.insert(field.to_string(), value);
        self
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field) || SYSTEM_FIELDS.contains(&field)
    }

    pub fn is_immutable(&self, field: &str) -> bool {
        SYSTEM_FIELDS.contains(&field) || self.immutable_fields.iter().any(|f| f == field)
    }

    pub fn is_numeric(&self, field: &str) -> bool {
        self.numeric_fields.iter().any(|f| f == field)
    }
}

/// Value counts as "missing" when absent, null, or a blank string
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// The closed set of collections the tools may touch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRegistry {
    collections: Vec<CollectionSchema>,
}

impl CollectionRegistry {
    pub fn new(collections: Vec<CollectionSchema>) -> Self {
        Self { collections }
    }

    pub fn get(&self, name: &str) -> Result<&CollectionSchema, ToolError> {
        self.collections
            .iter()
            .find(|schema| schema.name == name)
            .ok_or_else(|| ToolError::InvalidCollection {
                collection: name.to_string(),
            })
    }

    pub fn schemas(&self) -> &[CollectionSchema] {
        &self.collections
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.iter().map(|s| s.name.clone()).collect()
    }
}

impl Default for CollectionRegistry {
    /// The academic portal's collections
    fn default() -> Self {
        Self::new(vec![
            CollectionSchema::new(
                "students",
                &[
                    "name",
                    "roll_number",
                    "department",
                    "year",
                    "email",
                    "attendance_percentage",
                    "status",
                ],
            )
            .aliases(&["student", "students", "pupil", "pupils", "learner", "learners"])
            .required(&["name", "roll_number", "department"])
            .immutable(&["roll_number"])
            .numeric(&["year", "attendance_percentage"])
            .default_value("status", Value::String("active".to_string())),
            CollectionSchema::new(
                "courses",
                &["code", "title", "department", "credits", "instructor", "semester"],
            )
            .aliases(&["course", "courses", "subject", "subjects", "class", "classes"])
            .required(&["code", "title"])
            .immutable(&["code"])
            .numeric(&["credits", "semester"]),
            CollectionSchema::new(
                "attendance",
                &["student_id", "course_code", "date", "status", "percentage"],
            )
            .aliases(&["attendance", "absent", "absentees", "present"])
            .required(&["student_id", "course_code", "date", "status"])
            .numeric(&["percentage"]),
            CollectionSchema::new(
                "leave_requests",
                &[
                    "student_id",
                    "leave_type",
                    "start_date",
                    "end_date",
                    "reason",
                    "status",
                    "days",
                ],
            )
            .aliases(&[
                "leave request",
                "leave requests",
                "leave application",
                "leave applications",
                "leaves",
                "leave",
            ])
            .required(&["student_id", "leave_type", "start_date", "end_date", "reason"])
            .numeric(&["days"])
            .default_value("status", Value::String("pending".to_string())),
            CollectionSchema::new(
                "notices",
                &["title", "body", "audience", "posted_by", "priority"],
            )
            .aliases(&[
                "notice",
                "notices",
                "announcement",
                "announcements",
                "circular",
                "circulars",
            ])
            .required(&["title", "body"]),
            CollectionSchema::new("users", &["username", "full_name", "role", "email"])
                .aliases(&["user", "users", "account", "accounts", "faculty", "staff"])
                .required(&["username", "role"])
                .immutable(&["username"]),
            CollectionSchema::new(
                "documents",
                &["title", "category", "path", "owner", "description"],
            )
            .aliases(&["document", "documents", "file", "files", "form", "forms"])
            .required(&["title", "category"]),
        ])
    }
}
