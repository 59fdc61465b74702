mod identity;
mod ids;
mod question;
mod result;
mod session;
mod settings;

pub use ids::{AttemptId, ParseIdError, QuestionId};

pub use identity::{CandidateIdentity, IdentityDraft, IdentityError, IdentityField};
pub use question::{Question, QuestionBank, QuestionError};
pub use result::{CompletionReason, Percentage, ResultRecord, ResultSummary};
pub use session::{Phase, Session, SessionError, SessionProgress, Step, TickOutcome};
pub use settings::{
    DEFAULT_DURATION_SECONDS, DEFAULT_PASS_MARK_PERCENT, ExamSettings, ExamSettingsDraft,
    Navigation, SettingsError,
};
