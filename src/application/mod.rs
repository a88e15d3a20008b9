mod coordinator;
mod mirror;
mod model;
mod store;

pub use coordinator::WorkflowCoordinator;
pub use mirror::{build_mirror, DisabledMirror, MirrorDispatcher, SpreadsheetMirror, WebhookMirror};
pub use model::{
    normalize_field_name, Application, ApplicationContent, ApplicationStats, ApplicationStatus,
    Decision, NewApplication, SubmitterIdentity,
};
pub use store::{open_store, ApplicationStore, FileApplicationStore, MemoryApplicationStore};
