pub mod attempt;
mod ids;
mod license;
mod progress;
mod statistics;
mod template;

pub use attempt::{
    AnsweredQuestion, AttemptDraft, AttemptError, AttemptStatus, PersistedAttempt, TestAttempt,
    TestConfiguration, TestKind,
};
pub use ids::{
    AnswerId, CategoryId, LicenseTypeId, ParseIdError, QuestionId, TemplateId, TestAttemptId,
    UserId,
};
pub use license::{LicenseType, LicenseTypeFamily, LicenseTypeSummary};
pub use progress::QuestionProgress;
pub use statistics::UserStatistics;
pub use template::{TemplateError, TestTemplate};
