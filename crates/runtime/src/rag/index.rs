//! In-memory embedding index with brute-force cosine search.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::chunker::TextChunker;
use super::embedding::{cosine_similarity, EmbeddingService};
use super::knowledge::load_knowledge;
use super::types::{DocumentChunk, DocumentInput, IndexError, IndexStats, ScoredChunk};

/// Chunks grouped by parent source so re-indexing a source replaces it whole
type ChunkTable = HashMap<String, Vec<DocumentChunk>>;

#[derive(Default)]
struct IndexState {
    chunks: ChunkTable,
    last_rebuild: Option<DateTime<Utc>>,
}

/// Stores embedded document chunks and answers nearest-neighbour queries.
pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingService>,
    state: RwLock<IndexState>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedder,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Embed and chunk documents without touching the stored index.
    async fn build_chunks(
        &self,
        documents: Vec<DocumentInput>,
        chunker: TextChunker,
    ) -> Result<ChunkTable, IndexError> {
        let mut table = ChunkTable::new();
        let indexed_at = Utc::now();

        for document in documents {
            let pieces = chunker.chunk(&document.content);
            if pieces.is_empty() {
                tracing::debug!(source = %document.source, "Skipping empty document");
                continue;
            }

            let texts: Vec<&str> = pieces.iter().map(|piece| piece.text.as_str()).collect();
            let embeddings = self.embedder.generate_batch_embeddings(texts).await?;
            if embeddings.len() != pieces.len() {
                return Err(IndexError::EmbeddingUnavailable {
                    reason: format!(
                        "expected {} embeddings for {}, got {}",
                        pieces.len(),
                        document.source,
                        embeddings.len()
                    ),
                });
            }

            let total_chunks = pieces.len();
            let chunks = pieces
                .into_iter()
                .zip(embeddings)
                .map(|(piece, embedding)| DocumentChunk {
                    id: DocumentChunk::chunk_id(&document.source, piece.index),
                    source: document.source.clone(),
                    title: document.title.clone(),
                    category: document.category.clone(),
                    chunk_index: piece.index,
                    total_chunks,
                    text: piece.text,
                    embedding,
                    metadata: document.metadata.clone(),
                    indexed_at,
                })
                .collect();

            // A later document with the same source supersedes an earlier one
            table.insert(document.source.clone(), chunks);
        }

        Ok(table)
    }

    /// Chunk, embed and store documents. Re-adding a source replaces its
    /// previous chunks. Returns the number of chunks stored.
    pub async fn add_documents(
        &self,
        documents: Vec<DocumentInput>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<usize, IndexError> {
        let chunker = TextChunker::new(chunk_size, chunk_overlap)?;
        let table = self.build_chunks(documents, chunker).await?;
        let added: usize = table.values().map(Vec::len).sum();

        let mut state = self.state.write();
        for (source, chunks) in table {
            state.chunks.insert(source, chunks);
        }

        tracing::debug!(added, total = Self::count(&state.chunks), "Indexed documents");
        Ok(added)
    }

    /// Up to `k` chunks with similarity `>= threshold`, best first.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.generate_embedding(query).await?;

        let state = self.state.read();
        let mut hits: Vec<ScoredChunk> = state
            .chunks
            .values()
            .flatten()
            .filter_map(|chunk| {
                let similarity = cosine_similarity(&query_embedding, &chunk.embedding);
                (similarity >= threshold).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    similarity,
                })
            })
            .collect();
        drop(state);

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of stored chunks
    pub fn document_count(&self) -> usize {
        Self::count(&self.state.read().chunks)
    }

    fn count(table: &ChunkTable) -> usize {
        table.values().map(Vec::len).sum()
    }

    /// Replace the whole index with the contents of a knowledge source.
    ///
    /// The new index is fully built before the swap; on any failure the
    /// previous contents stay in place.
    pub async fn rebuild_index(
        &self,
        knowledge_source: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<usize, IndexError> {
        let chunker = TextChunker::new(chunk_size, chunk_overlap)?;
        let documents = load_knowledge(knowledge_source)?;
        let table = self
            .build_chunks(documents, chunker)
            .await
            .map_err(|e| match e {
                IndexError::EmbeddingUnavailable { reason } => IndexError::BuildFailed {
                    reason: format!("embedding failed during rebuild: {reason}"),
                },
                other => other,
            })?;

        let total = Self::count(&table);
        if total == 0 {
            return Err(IndexError::BuildFailed {
                reason: format!(
                    "knowledge source {} produced no chunks",
                    knowledge_source.display()
                ),
            });
        }

        {
            let mut state = self.state.write();
            state.chunks = table;
            state.last_rebuild = Some(Utc::now());
        }

        tracing::info!(
            source = %knowledge_source.display(),
            chunks = total,
            "Embedding index rebuilt"
        );
        Ok(total)
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            total_chunks: Self::count(&state.chunks),
            total_sources: state.chunks.len(),
            embedding_dimension: self.embedder.embedding_dimension(),
            last_rebuild: state.last_rebuild,
        }
    }
}
