//! Reading joint fabric membership information from a remote node.

use jointfab_types::{FabricIndex, ImStatus, NodeId};

use crate::error::ReadError;

pub const ROOT_ENDPOINT: u16 = 0;

pub const DESCRIPTOR_CLUSTER_ID: u32 = 0x001D;
pub const DEVICE_TYPE_LIST_ATTRIBUTE_ID: u32 = 0x0000;
pub const SERVER_LIST_ATTRIBUTE_ID: u32 = 0x0001;
pub const CLIENT_LIST_ATTRIBUTE_ID: u32 = 0x0002;
pub const PARTS_LIST_ATTRIBUTE_ID: u32 = 0x0003;

pub const JOINT_FABRIC_ADMINISTRATOR_CLUSTER_ID: u32 = 0x0753;
pub const ADMINISTRATOR_FABRIC_INDEX_ATTRIBUTE_ID: u32 = 0x0000;

/// A concrete or endpoint-wildcard attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePath {
    /// `None` matches every endpoint.
    pub endpoint: Option<u16>,
    pub cluster_id: u32,
    pub attribute_id: u32,
}

impl AttributePath {
    pub const fn new(endpoint: Option<u16>, cluster_id: u32, attribute_id: u32) -> Self {
        Self {
            endpoint,
            cluster_id,
            attribute_id,
        }
    }
}

/// The paths a membership read requests.
pub const JOINT_FABRIC_INFO_PATHS: [AttributePath; 5] = [
    AttributePath::new(Some(ROOT_ENDPOINT), DESCRIPTOR_CLUSTER_ID, DEVICE_TYPE_LIST_ATTRIBUTE_ID),
    AttributePath::new(Some(ROOT_ENDPOINT), DESCRIPTOR_CLUSTER_ID, SERVER_LIST_ATTRIBUTE_ID),
    AttributePath::new(Some(ROOT_ENDPOINT), DESCRIPTOR_CLUSTER_ID, CLIENT_LIST_ATTRIBUTE_ID),
    AttributePath::new(Some(ROOT_ENDPOINT), DESCRIPTOR_CLUSTER_ID, PARTS_LIST_ATTRIBUTE_ID),
    AttributePath::new(
        None,
        JOINT_FABRIC_ADMINISTRATOR_CLUSTER_ID,
        ADMINISTRATOR_FABRIC_INDEX_ATTRIBUTE_ID,
    ),
];

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeData {
    Null,
    Bool(bool),
    Unsigned(u64),
    List(Vec<AttributeData>),
}

/// Sends batched attribute reads to remote nodes. Reports arrive later
/// through [`MembershipReader::on_attribute_data`] and
/// [`MembershipReader::on_done`].
pub trait ReadClient {
    fn send_read_request(&mut self, target: NodeId, paths: &[AttributePath]) -> Result<(), ReadError>;
}

/// What a completed membership read yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMembership {
    pub target: NodeId,
    pub administrator_fabric_index: Option<FabricIndex>,
    pub parts_list: Vec<u16>,
}

#[derive(Debug)]
struct ReadSession {
    target: NodeId,
    administrator_fabric_index: Option<FabricIndex>,
    parts_list: Vec<u16>,
}

/// Drives one membership read at a time.
#[derive(Debug, Default)]
pub struct MembershipReader {
    in_flight: Option<ReadSession>,
}

impl MembershipReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Requests the membership attributes from `target`. A read already in
    /// flight is replaced. Nothing is kept if the request cannot be sent.
    pub fn read_joint_fabric_info(
        &mut self,
        client: &mut dyn ReadClient,
        target: NodeId,
    ) -> Result<(), ReadError> {
        if let Err(e) = client.send_read_request(target, &JOINT_FABRIC_INFO_PATHS) {
            tracing::error!(node_id = %target, error = %e, "joint fabric info read failed");
            return Err(e);
        }
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(node_id = %previous.target, "replacing in-flight membership read");
        }
        self.in_flight = Some(ReadSession {
            target,
            administrator_fabric_index: None,
            parts_list: Vec::new(),
        });
        Ok(())
    }

    /// Accepts one attribute report. Failed reports and attributes other
    /// than the parts list and administrator fabric index are ignored.
    pub fn on_attribute_data(&mut self, path: &AttributePath, data: &AttributeData, status: ImStatus) {
        let Some(session) = self.in_flight.as_mut() else {
            return;
        };
        if status != ImStatus::Success {
            return;
        }

        match (path.cluster_id, path.attribute_id) {
            (DESCRIPTOR_CLUSTER_ID, PARTS_LIST_ATTRIBUTE_ID) => match decode_parts_list(data) {
                Some(parts) => session.parts_list = parts,
                None => tracing::error!(node_id = %session.target, "undecodable parts list"),
            },
            (JOINT_FABRIC_ADMINISTRATOR_CLUSTER_ID, ADMINISTRATOR_FABRIC_INDEX_ATTRIBUTE_ID) => {
                match decode_fabric_index(data) {
                    Some(index) => session.administrator_fabric_index = index,
                    None => tracing::error!(
                        node_id = %session.target,
                        "undecodable administrator fabric index"
                    ),
                }
            }
            _ => {}
        }
    }

    /// Finishes the read, discarding its session.
    pub fn on_done(&mut self) -> Option<RemoteMembership> {
        let session = self.in_flight.take()?;
        tracing::info!(
            node_id = %session.target,
            administrator_fabric_index = session.administrator_fabric_index.map(FabricIndex::get),
            parts = session.parts_list.len(),
            "joint fabric info read complete"
        );
        Some(RemoteMembership {
            target: session.target,
            administrator_fabric_index: session.administrator_fabric_index,
            parts_list: session.parts_list,
        })
    }
}

fn decode_parts_list(data: &AttributeData) -> Option<Vec<u16>> {
    let AttributeData::List(items) = data else {
        return None;
    };
    items
        .iter()
        .map(|item| match item {
            AttributeData::Unsigned(v) => u16::try_from(*v).ok(),
            _ => None,
        })
        .collect()
}

/// `Some(None)` for null.
fn decode_fabric_index(data: &AttributeData) -> Option<Option<FabricIndex>> {
    match data {
        AttributeData::Null => Some(None),
        AttributeData::Unsigned(v) => u8::try_from(*v).ok().and_then(FabricIndex::new).map(Some),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingClient {
        requests: Vec<(NodeId, Vec<AttributePath>)>,
        fail: bool,
    }

    impl ReadClient for RecordingClient {
        fn send_read_request(
            &mut self,
            target: NodeId,
            paths: &[AttributePath],
        ) -> Result<(), ReadError> {
            if self.fail {
                return Err(ReadError {
                    target,
                    reason: "no session".into(),
                });
            }
            self.requests.push((target, paths.to_vec()));
            Ok(())
        }
    }

    const PARTS: AttributePath =
        AttributePath::new(Some(ROOT_ENDPOINT), DESCRIPTOR_CLUSTER_ID, PARTS_LIST_ATTRIBUTE_ID);
    const ADMIN_INDEX: AttributePath = AttributePath::new(
        Some(1),
        JOINT_FABRIC_ADMINISTRATOR_CLUSTER_ID,
        ADMINISTRATOR_FABRIC_INDEX_ATTRIBUTE_ID,
    );

    #[test]
    fn requests_five_paths_and_extracts_fabric_index() {
        let mut client = RecordingClient::default();
        let mut reader = MembershipReader::new();
        reader
            .read_joint_fabric_info(&mut client, NodeId(0x55))
            .expect("send");

        assert_eq!(client.requests.len(), 1);
        assert_eq!(client.requests[0].1.len(), 5);
        assert_eq!(client.requests[0].1[4].endpoint, None);
        assert!(reader.is_reading());

        reader.on_attribute_data(
            &PARTS,
            &AttributeData::List(vec![AttributeData::Unsigned(1), AttributeData::Unsigned(2)]),
            ImStatus::Success,
        );
        reader.on_attribute_data(&ADMIN_INDEX, &AttributeData::Unsigned(3), ImStatus::Success);
        // Ignored: unrelated attribute, failed status.
        reader.on_attribute_data(
            &JOINT_FABRIC_INFO_PATHS[0],
            &AttributeData::List(Vec::new()),
            ImStatus::Success,
        );
        reader.on_attribute_data(&ADMIN_INDEX, &AttributeData::Unsigned(9), ImStatus::Failure);

        let done = reader.on_done().expect("session");
        assert_eq!(done.target, NodeId(0x55));
        assert_eq!(done.administrator_fabric_index, FabricIndex::new(3));
        assert_eq!(done.parts_list, vec![1, 2]);
        assert!(!reader.is_reading());
        assert_eq!(reader.on_done(), None);
    }

    #[test]
    fn bad_values_are_skipped() {
        let mut client = RecordingClient::default();
        let mut reader = MembershipReader::new();
        reader
            .read_joint_fabric_info(&mut client, NodeId(1))
            .expect("send");
        reader.on_attribute_data(&ADMIN_INDEX, &AttributeData::Unsigned(255), ImStatus::Success);
        reader.on_attribute_data(&PARTS, &AttributeData::Bool(true), ImStatus::Success);
        let done = reader.on_done().expect("session");
        assert_eq!(done.administrator_fabric_index, None);
        assert!(done.parts_list.is_empty());
    }

    #[test]
    fn send_failure_keeps_no_session() {
        let mut client = RecordingClient {
            fail: true,
            ..Default::default()
        };
        let mut reader = MembershipReader::new();
        assert!(reader.read_joint_fabric_info(&mut client, NodeId(1)).is_err());
        assert!(!reader.is_reading());
    }

    #[test]
    fn second_read_replaces_first() {
        let mut client = RecordingClient::default();
        let mut reader = MembershipReader::new();
        reader.read_joint_fabric_info(&mut client, NodeId(1)).expect("first");
        reader.on_attribute_data(&ADMIN_INDEX, &AttributeData::Unsigned(2), ImStatus::Success);
        reader.read_joint_fabric_info(&mut client, NodeId(2)).expect("second");
        let done = reader.on_done().expect("session");
        assert_eq!(done.target, NodeId(2));
        assert_eq!(done.administrator_fabric_index, None);
    }
}
