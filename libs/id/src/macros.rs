//! Macros for defining typed integer keys.

/// Macro to define a typed integer key.
///
/// This generates a newtype wrapper around an unsigned integer with:
/// - A `KIND` constant used in error messages
/// - `from_raw()` and `raw()` accessors
/// - `Display` and `FromStr` implementations (plain decimal)
/// - `Serialize` and `Deserialize` implementations
/// - `Ord`, `Hash`, and other standard traits
///
/// The default form serializes the key as a number. The `string` form
/// serializes it as a decimal string and accepts either a string or a
/// number when deserializing.
///
/// # Example
///
/// ```ignore
/// define_key!(RackKey, u32, "rack");
/// define_key!(TaskKey, u64, "task", string);
///
/// let parsed: RackKey = "65537".parse()?;
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident, $repr:ty, $kind:literal) => {
        $crate::define_key!(@common $name, $repr, $kind);

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                <$repr as serde::Serialize>::serialize(&self.0, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = <$repr as serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self(raw))
            }
        }
    };

    ($name:ident, $repr:ty, $kind:literal, string) => {
        $crate::define_key!(@common $name, $repr, $kind);

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct KeyVisitor;

                impl<'de> serde::de::Visitor<'de> for KeyVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        write!(f, "a {} key as a decimal string or number", $kind)
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        $name::parse(v).map_err(E::custom)
                    }

                    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        <$repr>::try_from(v).map($name).map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(KeyVisitor)
            }
        }
    };

    (@common $name:ident, $repr:ty, $kind:literal) => {
        /// A typed key for this entity.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($repr);

        impl $name {
            /// Entity name used in error messages.
            pub const KIND: &'static str = $kind;

            /// Wraps a raw integer key.
            #[must_use]
            pub const fn from_raw(raw: $repr) -> Self {
                Self(raw)
            }

            /// Returns the raw integer key.
            #[must_use]
            pub const fn raw(&self) -> $repr {
                self.0
            }

            /// Parses a key from its decimal representation.
            pub fn parse(s: &str) -> Result<Self, $crate::KeyError> {
                if s.is_empty() {
                    return Err($crate::KeyError::Empty { kind: Self::KIND });
                }
                s.parse::<$repr>()
                    .map(Self)
                    .map_err(|e| $crate::KeyError::Invalid {
                        kind: Self::KIND,
                        input: s.to_string(),
                        reason: e.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $repr {
            fn from(key: $name) -> Self {
                key.0
            }
        }
    };
}
