//! Domain model (IDs, records, outcomes, progress, notifications, errors).
//!
//! 副作用なし。永続化や外部サービスは ports 側に置きます。

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod progress;
pub mod retry;
pub mod set;
pub mod task;
pub mod work_item;

pub use self::errors::{ErrorKind, RecordKind, TallyError};
pub use self::events::SetNotification;
pub use self::ids::{SetId, TaskId, slug};
pub use self::outcome::{OutcomeNotification, TaskOutcome};
pub use self::progress::{SetProgress, SetStatus};
pub use self::retry::RetryPolicy;
pub use self::set::{CounterField, SetAggregate, SetMetadata};
pub use self::task::{TaskRecord, TaskStatus};
pub use self::work_item::{Engine, SetSubmission, SynthesisParams, WorkItem, WorkMessage};
