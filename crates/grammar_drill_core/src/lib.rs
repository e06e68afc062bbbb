pub mod domain;
pub mod extractor;
pub mod generation;
pub mod ports;
pub mod prompts;
pub mod repair;
pub mod session;

pub use domain::{
    ChatMessage, Exercise, ExerciseAttempt, GenerationEvent, GrammarDomain, ReferenceTable,
    ResponseFormat, Role,
};
pub use extractor::{extract_all, Extraction, FragmentExtractor, ScanMode};
pub use generation::{EventStream, GenerationMode, Generator, GeneratorSettings};
pub use ports::{ChatCompletionService, PortError, PortResult, TextStream};
pub use repair::ExtractionError;
pub use session::{check_answer, ExerciseSession, Pacing, SessionError, SessionStatus};
