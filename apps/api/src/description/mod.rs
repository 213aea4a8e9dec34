// Job description generation from comma-separated qualifications and role duties.
// Single chat completion per request; the style picks the system prompt.

pub mod generator;
pub mod handlers;
