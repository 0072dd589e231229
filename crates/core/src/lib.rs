pub mod classifier;
pub mod compiler;
pub mod config;
pub mod deliverability;
pub mod domain;
pub mod errors;
pub mod fallback;
pub mod palette;
pub mod sanitizer;
pub mod text;

pub use classifier::{Classification, ClassificationRule, OperationClassifier, RuleKind};
pub use compiler::{CompiledInstruction, InstructionCompiler, PromptTemplate, UserContent};
pub use deliverability::{assess, DeliverabilityReport, SpamRisk};
pub use domain::document::{DocumentContent, DocumentId, EmailDocument};
pub use domain::instruction::{ImageIntent, ImageReference, Instruction, Operation, TargetElement};
pub use domain::message::{ConversationId, MessageId, MessageRecord, MessageRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use fallback::{FallbackEmail, FallbackGenerator};
pub use sanitizer::{ResponseSanitizer, SanitizeReport, SanitizedHtml};
pub use text::{lint, LintIssue, LintReport};
