// Managers Module
//
// Focused manager classes extracted from SyncContext.
//
// Each manager handles one specific concern:
// - AlignmentManager: background alignment passes, one per track

pub mod alignment_manager;

pub use alignment_manager::{AlignmentHandle, AlignmentJob, AlignmentManager};
