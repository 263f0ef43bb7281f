//! Introspection through the rosapi node's services.

use crate::connection::{Connection, Event, ERROR};
use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Topic names with their types, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsAndTypes {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Topic names with their types and full message definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsAndRawTypes {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub typedefs_full_text: Vec<String>,
}

/// What a node subscribes to, publishes and serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    #[serde(default)]
    pub subscribing: Vec<String>,
    #[serde(default)]
    pub publishing: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// One message type definition as reported by rosapi.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub fieldnames: Vec<String>,
    #[serde(default)]
    pub fieldtypes: Vec<String>,
    /// -1 for scalars, otherwise the array length (0 = unbounded).
    #[serde(default)]
    pub fieldarraylen: Vec<i64>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub constnames: Vec<String>,
    #[serde(default)]
    pub constvalues: Vec<String>,
}

/// Type definitions of a service's request or response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDetails {
    #[serde(default)]
    pub typedefs: Vec<TypeDef>,
}

#[derive(Deserialize)]
struct Topics {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct Services {
    #[serde(default)]
    services: Vec<String>,
}

#[derive(Deserialize)]
struct Nodes {
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Deserialize)]
struct ParamNames {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Deserialize)]
struct TypeName {
    #[serde(rename = "type", default)]
    type_name: String,
}

#[derive(Deserialize)]
struct ActionServers {
    #[serde(default)]
    action_servers: Vec<String>,
}

impl Connection {
    async fn rosapi<T: DeserializeOwned>(
        &self,
        service: &str,
        service_type: &str,
        args: Value,
    ) -> Result<T, ClientError> {
        self.service(service, service_type).request_as(args).await
    }

    /// Lists all topics and their types.
    pub async fn get_topics(&self) -> Result<TopicsAndTypes, ClientError> {
        self.rosapi("/rosapi/topics", "rosapi/Topics", json!({})).await
    }

    /// Lists the topics carrying `message_type`.
    pub async fn get_topics_for_type(&self, message_type: &str) -> Result<Vec<String>, ClientError> {
        let reply: Topics = self
            .rosapi("/rosapi/topics_for_type", "rosapi/TopicsForType", json!({ "type": message_type }))
            .await?;
        Ok(reply.topics)
    }

    /// Lists all topics with their full message definitions.
    pub async fn get_topics_and_raw_types(&self) -> Result<TopicsAndRawTypes, ClientError> {
        self.rosapi("/rosapi/topics_and_raw_types", "rosapi/TopicsAndRawTypes", json!({}))
            .await
    }

    /// Lists all services.
    pub async fn get_services(&self) -> Result<Vec<String>, ClientError> {
        let reply: Services = self.rosapi("/rosapi/services", "rosapi/Services", json!({})).await?;
        Ok(reply.services)
    }

    /// Lists the services of `service_type`.
    pub async fn get_services_for_type(&self, service_type: &str) -> Result<Vec<String>, ClientError> {
        let reply: Services = self
            .rosapi(
                "/rosapi/services_for_type",
                "rosapi/ServicesForType",
                json!({ "type": service_type }),
            )
            .await?;
        Ok(reply.services)
    }

    pub async fn get_service_request_details(&self, service_type: &str) -> Result<TypeDetails, ClientError> {
        self.rosapi(
            "/rosapi/service_request_details",
            "rosapi/ServiceRequestDetails",
            json!({ "type": service_type }),
        )
        .await
    }

    pub async fn get_service_response_details(&self, service_type: &str) -> Result<TypeDetails, ClientError> {
        self.rosapi(
            "/rosapi/service_response_details",
            "rosapi/ServiceResponseDetails",
            json!({ "type": service_type }),
        )
        .await
    }

    /// Lists all nodes.
    pub async fn get_nodes(&self) -> Result<Vec<String>, ClientError> {
        let reply: Nodes = self.rosapi("/rosapi/nodes", "rosapi/Nodes", json!({})).await?;
        Ok(reply.nodes)
    }

    pub async fn get_node_details(&self, node: &str) -> Result<NodeDetails, ClientError> {
        self.rosapi("/rosapi/node_details", "rosapi/NodeDetails", json!({ "node": node }))
            .await
    }

    /// Lists all parameter names.
    pub async fn get_params(&self) -> Result<Vec<String>, ClientError> {
        let reply: ParamNames = self
            .rosapi("/rosapi/get_param_names", "rosapi/GetParamNames", json!({}))
            .await?;
        Ok(reply.names)
    }

    pub async fn get_topic_type(&self, topic: &str) -> Result<String, ClientError> {
        let reply: TypeName = self
            .rosapi("/rosapi/topic_type", "rosapi/TopicType", json!({ "topic": topic }))
            .await?;
        Ok(reply.type_name)
    }

    pub async fn get_service_type(&self, service: &str) -> Result<String, ClientError> {
        let reply: TypeName = self
            .rosapi("/rosapi/service_type", "rosapi/ServiceType", json!({ "service": service }))
            .await?;
        Ok(reply.type_name)
    }

    /// Fetches the definition of `message_type` and every type it nests.
    pub async fn get_message_details(&self, message_type: &str) -> Result<Vec<TypeDef>, ClientError> {
        let reply: TypeDetails = self
            .rosapi("/rosapi/message_details", "rosapi/MessageDetails", json!({ "type": message_type }))
            .await?;
        Ok(reply.typedefs)
    }

    /// Lists the action servers.
    pub async fn get_action_servers(&self) -> Result<Vec<String>, ClientError> {
        let reply: ActionServers = self
            .rosapi("/rosapi/action_servers", "rosapi/GetActionServers", json!({}))
            .await?;
        Ok(reply.action_servers)
    }

    /// Expands the first of `defs` into a template object.
    ///
    /// Primitive fields map to their type name; nested types are resolved
    /// against `defs` recursively. Array fields wrap their element in a
    /// one-element list. A nested type missing from `defs` is reported on
    /// the `error` channel and its field is left out.
    pub fn decode_type_defs(&self, defs: &[TypeDef]) -> Value {
        match defs.first() {
            Some(root) => {
                let mut path = Vec::new();
                Value::Object(self.decode_type_def(root, defs, &mut path))
            }
            None => Value::Object(Map::new()),
        }
    }

    fn decode_type_def<'a>(
        &self,
        def: &'a TypeDef,
        defs: &'a [TypeDef],
        path: &mut Vec<&'a str>,
    ) -> Map<String, Value> {
        path.push(&def.type_name);
        let mut fields = Map::new();

        for (i, (name, field_type)) in def.fieldnames.iter().zip(&def.fieldtypes).enumerate() {
            let is_array = def.fieldarraylen.get(i).copied().unwrap_or(-1) != -1;

            let decoded = if !field_type.contains('/') {
                Value::String(field_type.clone())
            } else if path.contains(&field_type.as_str()) {
                self.report(format!("Recursive type {} in decode_type_defs", field_type));
                continue;
            } else if let Some(nested) = defs.iter().find(|d| d.type_name == *field_type) {
                Value::Object(self.decode_type_def(nested, defs, path))
            } else {
                self.report(format!("Cannot find {} in decode_type_defs", field_type));
                continue;
            };

            let value = if is_array {
                Value::Array(vec![decoded])
            } else {
                decoded
            };
            fields.insert(name.clone(), value);
        }

        path.pop();
        fields
    }

    fn report(&self, message: String) {
        tracing::warn!("{}", message);
        self.emit(ERROR, &Event::Error(message));
    }
}
