//! Declarative helpers for the string-backed enums stored in PostgreSQL.

/// Declares a `Copy` enum stored as lowercase text in the database and
/// serialized as SCREAMING_SNAKE_CASE in JSON.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $db:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Database string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $db ),+
                }
            }

            /// Parse the database string representation.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $db => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Parse a value read from a row, failing loudly on drift between
            /// the schema and the code.
            pub fn from_db(s: &str) -> Result<Self, $crate::shared::error::AppError> {
                Self::parse(s).ok_or_else(|| {
                    $crate::shared::error::AppError::Internal(format!(
                        "unknown {} value in database: {}",
                        stringify!($name),
                        s
                    ))
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
