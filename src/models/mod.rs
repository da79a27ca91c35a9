pub mod card;
pub mod project;
pub mod sync_state;
pub mod task;
pub mod todo;

pub use card::{Card, CardColumn, CardStep, CardTable};
pub use project::Project;
pub use sync_state::SyncState;
pub use task::AssignedTask;
pub use todo::{Todo, TodoList, TodoSet};
