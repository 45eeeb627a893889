//! Version graph and downgrade path search
//!
//! - `index`: the static diff index loaded at startup
//! - `path`: pure fewest-hop search over the declared edges

pub mod index;
pub mod path;

pub use index::DiffIndex;
pub use path::find_shortest_path;
