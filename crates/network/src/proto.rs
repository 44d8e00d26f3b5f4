//! Protobuf messages of the `V1` peer protocol. Header, block and
//! transaction payloads travel as opaque RLP blobs.

/// The chain tip a peer advertises.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct V1Status {
    #[prost(uint64, tag = "1")]
    pub number: u64,
    #[prost(string, tag = "2")]
    pub hash: ::prost::alloc::string::String,
    /// Total difficulty, decimal-encoded.
    #[prost(string, tag = "3")]
    pub difficulty: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct GetHeadersRequest {
    #[prost(int64, tag = "1")]
    pub number: i64,
    #[prost(string, tag = "2")]
    pub hash: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub skip: i64,
    #[prost(int64, tag = "4")]
    pub amount: i64,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct HeadersResponse {
    /// RLP-encoded headers.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub objs: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct GetBlocksRequest {
    #[prost(uint64, tag = "1")]
    pub from: u64,
    #[prost(uint64, tag = "2")]
    pub to: u64,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BlocksResponse {
    /// RLP-encoded blocks.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub blocks: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct GetBodiesRequest {
    /// Header hashes, 32 bytes each.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub hashes: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

/// One block body: its transactions as RLP blobs.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BodyMessage {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub transactions: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BodiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub bodies: ::prost::alloc::vec::Vec<BodyMessage>,
}

/// Push notification of a newly available block.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct NotifyRequest {
    #[prost(message, optional, tag = "1")]
    pub status: ::core::option::Option<V1Status>,
    /// The RLP-encoded block.
    #[prost(bytes = "vec", tag = "2")]
    pub raw: ::prost::alloc::vec::Vec<u8>,
}

/// A gossiped pending transaction.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct TxnMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub raw: ::prost::alloc::vec::Vec<u8>,
}

/// A gossiped block announcement.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BlockMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub raw: ::prost::alloc::vec::Vec<u8>,
}
