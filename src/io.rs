//! Helper functions for serialization & deserialization.

use bincode::{deserialize_from, serialize_into};
use serde::Serialize;

use crate::error::*;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Parse an arbitrary deserializable type from a file path.
pub fn from_file<T>(p: &str) -> RmemResult<T>
    where T: serde::de::DeserializeOwned
{
    let f = File::open(Path::new(p))?;
    let mut reader = BufReader::new(f);
    Ok(deserialize_from(&mut reader)?)
}

/// Write an arbitrary serializable type to a file path.
pub fn write_to_file<T>(t: &T, p: &str) -> RmemResult<()>
    where T: Serialize
{
    let f = File::create(Path::new(p))?;
    let mut writer = BufWriter::new(f);
    Ok(serialize_into(&mut writer, t)?)
}
