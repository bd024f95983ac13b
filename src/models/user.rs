use serde::{Deserialize, Serialize};

// The struct used for receiving a batch of identity ids to resolve as json
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UsernamesRequest {
    pub user_ids: Vec<String>,
}

// Finished-game tally for one identity within one game kind
#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRecord {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

// The struct used to respond with a joinable room and its host as json
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RoomListing {
    pub id: String,
    pub host: String,
    pub host_name: String,
    pub record: PlayerRecord,
}
