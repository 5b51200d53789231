//! The typed vector-property data model: the five element shapes, their
//! containing vector, and the supporting value types (state, permission,
//! switch rule, driver interface bitmask).

mod interface;
mod items;
mod perm;
mod state;
mod switch;
mod value;
mod vector;

pub use interface::DriverInterface;
pub use items::ItemMap;
pub use perm::PropertyPerm;
pub use state::PropertyState;
pub use switch::{SwitchRule, SwitchState};
pub use value::{TypedValue, VectorKind};
pub use vector::{VectorAction, VectorProperty};
