//! Command implementations for the pagewatch CLI

mod check;
mod history;

pub use check::execute as check_url;
pub use history::execute as show_history;
