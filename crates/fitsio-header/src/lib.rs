//! FITS header metadata: 80-column cards, ordered headers, and declarative
//! schemas that validate a header against structural rules.

pub mod block;
pub mod card;
pub mod error;
pub mod header;
pub mod schema;
pub mod value;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use card::{Card, CardKind, NonStandard};
pub use error::{Error, Property, Result, SchemaError};
pub use header::Header;
pub use schema::{KeywordProperties, Schema, SchemaBuilder};
pub use value::Value;
