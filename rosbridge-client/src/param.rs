//! Parameter server access through the rosapi services.

use crate::connection::Connection;
use crate::error::ClientError;
use serde_json::{json, Value};

const GET_PARAM: (&str, &str) = ("/rosapi/get_param", "rosapi/GetParam");
const SET_PARAM: (&str, &str) = ("/rosapi/set_param", "rosapi/SetParam");
const DELETE_PARAM: (&str, &str) = ("/rosapi/delete_param", "rosapi/DeleteParam");

/// A named parameter.
///
/// Values travel JSON-encoded inside a string field, so any JSON value can be
/// stored and read back unchanged.
#[derive(Debug, Clone)]
pub struct Param {
    conn: Connection,
    name: String,
}

impl Param {
    pub fn new(conn: &Connection, name: impl Into<String>) -> Self {
        Self {
            conn: conn.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the parameter.
    pub async fn get(&self) -> Result<Value, ClientError> {
        let (name, ty) = GET_PARAM;
        let values = self
            .conn
            .service(name, ty)
            .request(json!({ "name": self.name }))
            .await?;

        let encoded = values
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} reply has no value", name)))?;
        Ok(serde_json::from_str(encoded)?)
    }

    /// Writes the parameter.
    pub async fn set(&self, value: &Value) -> Result<(), ClientError> {
        let (name, ty) = SET_PARAM;
        self.conn
            .service(name, ty)
            .request(json!({ "name": self.name, "value": serde_json::to_string(value)? }))
            .await?;
        Ok(())
    }

    /// Deletes the parameter.
    pub async fn delete(&self) -> Result<(), ClientError> {
        let (name, ty) = DELETE_PARAM;
        self.conn
            .service(name, ty)
            .request(json!({ "name": self.name }))
            .await?;
        Ok(())
    }
}

impl Connection {
    /// Creates a parameter handle on this connection.
    pub fn param(&self, name: impl Into<String>) -> Param {
        Param::new(self, name)
    }
}
