//! Command implementations

pub mod load;

use crate::programmers;

/// Print the list of available programmers
pub fn list_programmers() {
    print!("{}", programmers::programmer_help());
}
