pub mod extractor;
pub mod llm;

pub use extractor::{ContentExtractor, HttpExtractor};
pub use llm::{CompletionOptions, CompletionProvider, Message, OpenRouterProvider};
