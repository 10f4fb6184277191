mod crud;
mod helpers;
mod history;
mod prelude;
mod runs;

pub use crud::{delete_workflow, get_workflow, list_workflows, rename_workflow, save_workflow};
pub use history::{get_execution, list_executions};
pub use runs::{run_saved_workflow, run_unsaved_workflow};
