use serde::{Deserialize, Deserializer};

pub fn user_agent() -> String {
    return format!("digestpin/{}", env!("CARGO_PKG_VERSION"));
}

/// Deserializes `null` as the type's default, the daemon encodes empty
/// lists that way.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    return Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default());
}
