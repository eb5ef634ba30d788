//! Encode/decode at stream boundaries.
//!
//! Inside a task keys and messages are [`Value`]s; a [`KvSerde`] attached to each
//! input and output stream converts between those and bytes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::types::{StreamData, Value};

/// Typed serializer for one side (key or message) of a stream.
pub trait Serde<T>: Send + Sync {
    fn to_bytes(&self, value: &T) -> Result<Vec<u8>>;
    fn from_bytes(&self, bytes: &[u8]) -> Result<T>;
}

/// bincode-backed serde for any [`StreamData`].
pub struct BincodeSerde<T>(PhantomData<fn() -> T>);

impl<T> BincodeSerde<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for BincodeSerde<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StreamData> Serde<T> for BincodeSerde<T> {
    fn to_bytes(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value)
            .with_context(|| format!("encoding {}", std::any::type_name::<T>()))
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes)
            .with_context(|| format!("decoding {}", std::any::type_name::<T>()))
    }
}

/// Plain UTF-8 strings, for keys readable by other systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerde;

impl Serde<String> for StringSerde {
    fn to_bytes(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).context("decoding utf-8 string")
    }
}

/// Serde over type-erased values.
pub trait ValueSerde: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

struct Erased<T, S> {
    serde: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> ValueSerde for Erased<T, S>
where
    T: Clone + Send + 'static,
    S: Serde<T>,
{
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let typed = value.downcast_ref::<T>().ok_or_else(|| {
            anyhow!(
                "serde for {} cannot encode {}",
                std::any::type_name::<T>(),
                value.type_name()
            )
        })?;
        self.serde.to_bytes(typed)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(Value::new(self.serde.from_bytes(bytes)?))
    }
}

/// Erase a typed serde so it can be stored per stream.
pub fn erase<T, S>(serde: S) -> Arc<dyn ValueSerde>
where
    T: Clone + Send + 'static,
    S: Serde<T> + 'static,
{
    Arc::new(Erased {
        serde,
        _marker: PhantomData,
    })
}

/// Key and message serdes of one stream.
#[derive(Clone)]
pub struct KvSerde {
    key: Arc<dyn ValueSerde>,
    message: Arc<dyn ValueSerde>,
}

impl KvSerde {
    pub fn new(key: Arc<dyn ValueSerde>, message: Arc<dyn ValueSerde>) -> Self {
        Self { key, message }
    }

    pub fn of<K, M, KS, MS>(key: KS, message: MS) -> Self
    where
        K: Clone + Send + 'static,
        M: Clone + Send + 'static,
        KS: Serde<K> + 'static,
        MS: Serde<M> + 'static,
    {
        Self::new(erase::<K, _>(key), erase::<M, _>(message))
    }

    /// bincode on both sides.
    pub fn bincode<K: StreamData, M: StreamData>() -> Self {
        Self::of::<K, M, _, _>(BincodeSerde::new(), BincodeSerde::new())
    }

    pub fn encode_key(&self, key: &Value) -> Result<Vec<u8>> {
        self.key.encode(key)
    }

    pub fn decode_key(&self, bytes: &[u8]) -> Result<Value> {
        self.key.decode(bytes)
    }

    pub fn encode_message(&self, message: &Value) -> Result<Vec<u8>> {
        self.message.encode(message)
    }

    pub fn decode_message(&self, bytes: &[u8]) -> Result<Value> {
        self.message.decode(bytes)
    }
}

impl fmt::Debug for KvSerde {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KvSerde(<erased>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct PageView {
        member_id: String,
        page: String,
    }

    #[test]
    fn test_kv_serde_bincode() {
        let serde = KvSerde::bincode::<String, PageView>();
        let view = PageView {
            member_id: "m1".into(),
            page: "/home".into(),
        };

        let bytes = serde.encode_message(&Value::new(view.clone())).unwrap();
        let decoded = serde.decode_message(&bytes).unwrap();
        assert_eq!(decoded.downcast::<PageView>().unwrap(), view);
    }

    #[test]
    fn test_encode_wrong_type_fails() {
        let serde = KvSerde::bincode::<String, PageView>();
        let err = serde.encode_key(&Value::new(7u64)).unwrap_err();
        assert!(err.to_string().contains("u64"));
    }

    #[test]
    fn test_string_serde_is_plain_utf8() {
        let serde = KvSerde::of::<String, u64, _, _>(StringSerde, BincodeSerde::new());
        let bytes = serde.encode_key(&Value::new("member-9".to_string())).unwrap();
        assert_eq!(bytes, b"member-9");
        assert!(StringSerde.from_bytes(&[0xff, 0xfe]).is_err());
    }
}
