pub mod dsn;
pub mod schema;
pub mod ses;
pub mod sexp;

// Re-export for convenience
pub use dsn::{DsnParseError, DsnParser};
pub use schema::*;
pub use ses::SesParser;
pub use sexp::{ParseError, SExp, SExpParser};
