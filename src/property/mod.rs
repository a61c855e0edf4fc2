pub mod cell;
pub mod guard;
pub mod subscription;

pub use cell::PropertyCell;
pub(crate) use cell::TrackedCell;
pub use guard::{FnTransformer, FnValidator, Guard, LengthValidator, RangeValidator, Transformer, Validator};
pub use subscription::Subscription;
