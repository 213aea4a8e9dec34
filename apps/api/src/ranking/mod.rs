// CV ranking: multipart upload → PDF text → normalization → embeddings →
// request-scoped vector index partition → top-k similarity → cleanup.
// All LLM and embedding calls go through llm_client via the ChatModel / Embedder seams.

pub mod handlers;
pub mod pipeline;
