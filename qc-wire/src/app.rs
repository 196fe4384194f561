use bytes::{Buf, BufMut, BytesMut};

use crate::error::WireError;

/// Discriminator tag carried as the first two bytes of every DATA packet
/// body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DataId {
    HelloC2s = 0,
    HelloBackS2c = 1,
    VoteRequestC2s = 2,
    VoteBroadcastS2c = 3,
    VoteResponseC2s = 4,
    VoteResultS2c = 5,
}

impl DataId {
    fn from_u16(v: u16) -> Result<Self, WireError> {
        Ok(match v {
            0 => Self::HelloC2s,
            1 => Self::HelloBackS2c,
            2 => Self::VoteRequestC2s,
            3 => Self::VoteBroadcastS2c,
            4 => Self::VoteResponseC2s,
            5 => Self::VoteResultS2c,
            other => return Err(WireError::UnknownDataId(other)),
        })
    }
}

/// A referendum response code, also used to tag the final server result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VoteAnswer {
    Unsat = 0,
    Sat = 1,
    SyntaxError = 2,
    Timeout = 3,
}

impl VoteAnswer {
    pub fn from_u16(v: u16) -> Result<Self, WireError> {
        Ok(match v {
            0 => Self::Unsat,
            1 => Self::Sat,
            2 => Self::SyntaxError,
            3 => Self::Timeout,
            other => return Err(WireError::UnknownDataId(other)),
        })
    }

    pub fn flip(self) -> Self {
        match self {
            Self::Sat => Self::Unsat,
            Self::Unsat => Self::Sat,
            other => other,
        }
    }
}

/// A fully decoded application message (the body of a DATA packet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMessage {
    Hello { back: bool, version: u32, features: Vec<u16> },
    Vote { broadcast: bool, vote_id: u128, question: Vec<u8> },
    Response { result: bool, vote_id: u128, answer: VoteAnswer },
}

/// `(version, num_features, features)` — `num_features` is always the
/// actual length of `features` on serialization; deserialization trusts the
/// stored count (spec.md §4.1).
pub fn serialize_hello(data_id: DataId, version: u32, features: &[u16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2 + 4 + 2 + features.len() * 2);
    buf.put_u16(data_id as u16);
    buf.put_u32(version);
    buf.put_u16(features.len() as u16);
    for f in features {
        buf.put_u16(*f);
    }
    buf.to_vec()
}

pub fn deserialize_hello(body: &[u8]) -> Result<(DataId, u32, Vec<u16>), WireError> {
    let mut buf = body;
    if buf.remaining() < 2 {
        return Err(WireError::Truncated);
    }
    let data_id = DataId::from_u16(buf.get_u16())?;

    if buf.remaining() < 6 {
        return Err(WireError::Truncated);
    }
    let version = buf.get_u32();
    let num_features = buf.get_u16() as usize;

    if buf.remaining() < num_features * 2 {
        return Err(WireError::Truncated);
    }
    let features = (0..num_features).map(|_| buf.get_u16()).collect();

    Ok((data_id, version, features))
}

/// `(vote_id, question_len, question)`.
pub fn serialize_vote_question(data_id: DataId, vote_id: u128, question: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2 + 16 + 4 + question.len());
    buf.put_u16(data_id as u16);
    buf.put_u128(vote_id);
    buf.put_u32(question.len() as u32);
    buf.put_slice(question);
    buf.to_vec()
}

pub fn deserialize_vote_question(body: &[u8]) -> Result<(DataId, u128, Vec<u8>), WireError> {
    let mut buf = body;
    if buf.remaining() < 2 + 16 + 4 {
        return Err(WireError::Truncated);
    }
    let data_id = DataId::from_u16(buf.get_u16())?;
    let vote_id = buf.get_u128();
    let question_len = buf.get_u32() as usize;

    if buf.remaining() < question_len {
        return Err(WireError::Truncated);
    }
    let question = buf[..question_len].to_vec();

    Ok((data_id, vote_id, question))
}

/// `(vote_id, response)`.
pub fn serialize_vote_response(data_id: DataId, vote_id: u128, response: VoteAnswer) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2 + 16 + 2);
    buf.put_u16(data_id as u16);
    buf.put_u128(vote_id);
    buf.put_u16(response as u16);
    buf.to_vec()
}

pub fn deserialize_vote_response(body: &[u8]) -> Result<(DataId, u128, VoteAnswer), WireError> {
    let mut buf = body;
    if buf.remaining() < 2 + 16 + 2 {
        return Err(WireError::Truncated);
    }
    let data_id = DataId::from_u16(buf.get_u16())?;
    let vote_id = buf.get_u128();
    let response = VoteAnswer::from_u16(buf.get_u16())?;

    Ok((data_id, vote_id, response))
}

/// Reads the leading `data_id` and dispatches to the matching decoder,
/// producing a fully-typed `AppMessage`.
pub fn decode_app_message(body: &[u8]) -> Result<AppMessage, WireError> {
    if body.len() < 2 {
        return Err(WireError::Truncated);
    }
    let tag = u16::from_be_bytes([body[0], body[1]]);
    let data_id = DataId::from_u16(tag)?;

    match data_id {
        DataId::HelloC2s | DataId::HelloBackS2c => {
            let (data_id, version, features) = deserialize_hello(body)?;
            Ok(AppMessage::Hello { back: data_id == DataId::HelloBackS2c, version, features })
        }
        DataId::VoteRequestC2s | DataId::VoteBroadcastS2c => {
            let (data_id, vote_id, question) = deserialize_vote_question(body)?;
            Ok(AppMessage::Vote { broadcast: data_id == DataId::VoteBroadcastS2c, vote_id, question })
        }
        DataId::VoteResponseC2s | DataId::VoteResultS2c => {
            let (data_id, vote_id, answer) = deserialize_vote_response(body)?;
            Ok(AppMessage::Response { result: data_id == DataId::VoteResultS2c, vote_id, answer })
        }
    }
}

pub fn encode_app_message(msg: &AppMessage) -> Vec<u8> {
    match msg {
        AppMessage::Hello { back, version, features } => {
            let id = if *back { DataId::HelloBackS2c } else { DataId::HelloC2s };
            serialize_hello(id, *version, features)
        }
        AppMessage::Vote { broadcast, vote_id, question } => {
            let id = if *broadcast { DataId::VoteBroadcastS2c } else { DataId::VoteRequestC2s };
            serialize_vote_question(id, *vote_id, question)
        }
        AppMessage::Response { result, vote_id, answer } => {
            let id = if *result { DataId::VoteResultS2c } else { DataId::VoteResponseC2s };
            serialize_vote_response(id, *vote_id, *answer)
        }
    }
}
