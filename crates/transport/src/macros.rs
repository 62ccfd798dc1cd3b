/// Declares a closed set of wire string tokens.
///
/// An extra `Unrecognized(String)` variant captures tokens introduced by newer
/// servers, decoding a string never fails.
///
/// ```
/// xenrpc_transport::wire_enum! {
///     pub enum PowerState {
///         Halted => "Halted",
///         Running => "Running",
///     }
/// }
///
/// use xenrpc_transport::{Decode as _, Value};
///
/// assert_eq!(PowerState::decode(Value::from("Running")).unwrap(), PowerState::Running);
/// assert_eq!(
///     PowerState::decode(Value::from("Crashed")).unwrap(),
///     PowerState::Unrecognized("Crashed".into()),
/// );
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )*
            /// Token unknown to this client
            Unrecognized(::std::string::String),
        }

        impl $name {
            /// Tokens known to this client
            pub const TOKENS: &'static [&'static str] = &[$($wire),*];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)*
                    Self::Unrecognized(token) => token.as_str(),
                }
            }
        }

        impl ::core::convert::From<&str> for $name {
            fn from(token: &str) -> Self {
                match token {
                    $($wire => Self::$variant,)*
                    _ => Self::Unrecognized(token.to_string()),
                }
            }
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self::Unrecognized(::std::string::String::new())
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::Encode for $name {
            fn encode(&self) -> ::core::result::Result<$crate::Value, $crate::EncodeError> {
                ::core::result::Result::Ok($crate::Value::String(self.as_str().to_string()))
            }
        }

        impl $crate::Decode for $name {
            fn decode(value: $crate::Value) -> ::core::result::Result<Self, $crate::DecodeError> {
                match value {
                    $crate::Value::String(token) => ::core::result::Result::Ok(Self::from(token.as_str())),
                    v => ::core::result::Result::Err($crate::DecodeError::mismatch("enum", &v)),
                }
            }
        }
    };
}

/// Declares a record whose fields map onto named entries of a wire map.
///
/// Fields missing from the wire decode to their zero value, entries unknown to
/// the record are ignored.
///
/// ```
/// xenrpc_transport::wire_record! {
///     pub struct Metrics {
///         pub memory_actual: i64 => "memory_actual",
///         pub vcpus_number: i64 => "VCPUs_number",
///     }
/// }
///
/// use std::collections::BTreeMap;
/// use xenrpc_transport::{Decode as _, Value};
///
/// let m = Metrics::decode(Value::Map(BTreeMap::from([
///     ("VCPUs_number".to_string(), Value::Int(2)),
/// ])))
/// .unwrap();
/// assert_eq!(m.vcpus_number, 2);
/// assert_eq!(m.memory_actual, 0);
/// ```
#[macro_export]
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident: $ty:ty => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::Encode for $name {
            fn encode(&self) -> ::core::result::Result<$crate::Value, $crate::EncodeError> {
                let mut map = ::std::collections::BTreeMap::new();
                $(
                    map.insert(
                        ::std::string::String::from($wire),
                        $crate::Encode::encode(&self.$field).map_err(|err| err.within($wire))?,
                    );
                )*
                ::core::result::Result::Ok($crate::Value::Map(map))
            }
        }

        impl $crate::Decode for $name {
            fn decode(value: $crate::Value) -> ::core::result::Result<Self, $crate::DecodeError> {
                #[allow(unused_mut)]
                let mut map = $crate::codec::expect_map(value)?;
                ::core::result::Result::Ok(Self {
                    $($field: $crate::codec::take_field(&mut map, $wire)?,)*
                })
            }
        }
    };
}
