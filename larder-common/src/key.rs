// Copyright 2025 larder Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cache key derivation.
//!
//! A key is assembled from the identity of the cached operation, an optional prefix, the positional arguments and the
//! keyword arguments sorted by name, joined with `:`.
//!
//! Each argument is rendered as compact JSON when that rendering parses back into the same structure. Anything else
//! (maps with composite keys, integers beyond 64 bits, ...) is rendered as the hash of its `Debug` form, which keeps
//! the key stable but opaque. Hashed renderings are best-effort: two distinct values with identical `Debug` output
//! share a key.

use std::fmt::Debug;

use serde::Serialize;
use serde_json::Value;

use crate::hasher::hex_hash;

/// Keys longer than this are shortened to `identity:<hash>`.
pub const MAX_KEY_LEN: usize = 250;

/// One rendered call argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyArg(Option<String>);

impl KeyArg {
    /// Render an argument.
    ///
    /// Values that serialize to JSON `null` (`None`, `()`) become the none sentinel.
    pub fn new<T>(value: &T) -> Self
    where
        T: Serialize + Debug + ?Sized,
    {
        match render(value) {
            Some(Value::Null) => Self(None),
            Some(v) => Self(Some(v.to_string())),
            None => Self(Some(format!("#{}", hex_hash(format!("{value:?}").as_bytes())))),
        }
    }

    /// An argument the caller has already rendered.
    pub fn raw(rendered: impl Into<String>) -> Self {
        Self(Some(rendered.into()))
    }

    /// The none sentinel. A call carrying it in positional position is never cached.
    pub fn none() -> Self {
        Self(None)
    }

    /// Whether this is the none sentinel.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The rendered form.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("null")
    }
}

/// Serialize and check that the JSON text parses back into an equal structure.
fn render<T>(value: &T) -> Option<Value>
where
    T: Serialize + ?Sized,
{
    let structured = serde_json::to_value(value).ok()?;
    let text = serde_json::to_string(value).ok()?;
    let parsed: Value = serde_json::from_str(&text).ok()?;
    (parsed == structured).then_some(structured)
}

/// Whether any argument is the none sentinel.
pub fn contains_none(args: &[KeyArg]) -> bool {
    args.iter().any(KeyArg::is_none)
}

/// Assemble the cache key of one call.
///
/// Layout is `identity[:prefix]:arg..:name=arg..`, keyword arguments sorted by name. A key longer than
/// [`MAX_KEY_LEN`] is replaced by `identity:<hash of the full key>`, which keeps the identity usable as an
/// invalidation pattern.
pub fn derive_key(identity: &str, args: &[KeyArg], kwargs: &[(&str, KeyArg)], prefix: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(2 + args.len() + kwargs.len());
    parts.push(identity.to_string());
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        parts.push(prefix.to_string());
    }
    parts.extend(args.iter().map(|arg| arg.as_str().to_string()));

    let mut kwargs = kwargs.iter().collect::<Vec<_>>();
    kwargs.sort_by(|a, b| a.0.cmp(b.0));
    parts.extend(kwargs.into_iter().map(|(name, arg)| format!("{name}={}", arg.as_str())));

    let key = parts.join(":");
    if key.len() > MAX_KEY_LEN {
        return format!("{identity}:{}", hex_hash(key.as_bytes()));
    }
    key
}

/// Arguments of a cached call.
///
/// Implemented for `()` and tuples of up to eight [`Serialize`] + [`Debug`] values. Parameter structs may implement
/// it by hand to contribute keyword arguments.
pub trait KeyArgs {
    /// Render every positional argument.
    fn key_args(&self) -> Vec<KeyArg>;

    /// Render every keyword argument.
    fn key_kwargs(&self) -> Vec<(&'static str, KeyArg)> {
        vec![]
    }
}

impl KeyArgs for () {
    fn key_args(&self) -> Vec<KeyArg> {
        vec![]
    }
}

impl KeyArgs for Vec<KeyArg> {
    fn key_args(&self) -> Vec<KeyArg> {
        self.clone()
    }
}

macro_rules! for_all_tuples {
    ($macro:ident) => {
        $macro! { {0 A} }
        $macro! { {0 A} {1 B} }
        $macro! { {0 A} {1 B} {2 C} }
        $macro! { {0 A} {1 B} {2 C} {3 D} }
        $macro! { {0 A} {1 B} {2 C} {3 D} {4 E} }
        $macro! { {0 A} {1 B} {2 C} {3 D} {4 E} {5 F} }
        $macro! { {0 A} {1 B} {2 C} {3 D} {4 E} {5 F} {6 G} }
        $macro! { {0 A} {1 B} {2 C} {3 D} {4 E} {5 F} {6 G} {7 H} }
    };
}

macro_rules! impl_key_args {
    ($( {$idx:tt $ty:ident} )*) => {
        impl<$($ty),*> KeyArgs for ($($ty,)*)
        where
            $($ty: Serialize + Debug,)*
        {
            fn key_args(&self) -> Vec<KeyArg> {
                vec![$(KeyArg::new(&self.$idx)),*]
            }
        }
    };
}

for_all_tuples! { impl_key_args }

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;

    #[test]
    fn test_key_layout() {
        let key = derive_key(
            "forms::load",
            &[KeyArg::new(&7), KeyArg::new("intake")],
            &[("version", KeyArg::new(&2)), ("draft", KeyArg::new(&false))],
            Some("v1"),
        );
        assert_eq!(key, r#"forms::load:v1:7:"intake":draft=false:version=2"#);
    }

    #[test]
    fn test_kwargs_order_independent() {
        let a = derive_key("f", &[], &[("a", KeyArg::new(&1)), ("b", KeyArg::new(&2))], None);
        let b = derive_key("f", &[], &[("b", KeyArg::new(&2)), ("a", KeyArg::new(&1))], None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_prefix_ignored() {
        assert_eq!(
            derive_key("f", &[KeyArg::new(&1)], &[], Some("")),
            derive_key("f", &[KeyArg::new(&1)], &[], None)
        );
    }

    #[test]
    fn test_none_sentinel() {
        assert!(KeyArg::new(&Option::<u64>::None).is_none());
        assert!(KeyArg::new(&()).is_none());
        assert!(!KeyArg::new(&Some(0u64)).is_none());
        assert!(contains_none(&(1, Option::<String>::None).key_args()));
        assert!(!contains_none(&(1, "x").key_args()));
    }

    #[test]
    fn test_unrepresentable_falls_back_to_hash() {
        let composite: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        let arg = KeyArg::new(&composite);
        assert!(arg.as_str().starts_with('#'));
        assert_eq!(arg.as_str().len(), 17);
        assert_eq!(arg, KeyArg::new(&composite));
    }

    #[test]
    fn test_structured_arg() {
        let filters = BTreeMap::from([("status", "open"), ("owner", "ann")]);
        assert_eq!(KeyArg::new(&filters).as_str(), r#"{"owner":"ann","status":"open"}"#);
    }

    #[test]
    fn test_long_key_is_hashed() {
        let long = "x".repeat(300);
        let key = derive_key("reports::render", &[KeyArg::new(&long)], &[], None);
        assert!(key.starts_with("reports::render:"));
        assert_eq!(key.len(), "reports::render:".len() + 16);
        assert_eq!(key, derive_key("reports::render", &[KeyArg::new(&long)], &[], None));
    }

    struct Search {
        owner: &'static str,
        status: Option<&'static str>,
        limit: u32,
    }

    impl KeyArgs for Search {
        fn key_args(&self) -> Vec<KeyArg> {
            vec![KeyArg::new(self.owner)]
        }

        fn key_kwargs(&self) -> Vec<(&'static str, KeyArg)> {
            vec![("status", KeyArg::new(&self.status)), ("limit", KeyArg::new(&self.limit))]
        }
    }

    #[test]
    fn test_keyword_args() {
        let search = Search {
            owner: "ann",
            status: None,
            limit: 10,
        };
        let key = derive_key("forms::search", &search.key_args(), &search.key_kwargs(), None);
        assert_eq!(key, r#"forms::search:"ann":limit=10:status=null"#);
        // a none keyword argument does not bypass caching
        assert!(!contains_none(&search.key_args()));
    }

    #[test]
    fn test_tuple_args() {
        let args = (1u32, "a", vec![1, 2]).key_args();
        let rendered = args.iter().map(KeyArg::as_str).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["1", "\"a\"", "[1,2]"]);
    }
}
