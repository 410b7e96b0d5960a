/// Status code type carried on the wire alongside every response.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const IO_ERROR: status_code_t = 69;
    pub const UNKNOWN: status_code_t = 999;
}

/// Coordination service status codes (1xxx).
pub mod CoordCode {
    use super::status_code_t;

    pub const KEY_NOT_FOUND: status_code_t = 1000;
    pub const CAS_FAILED: status_code_t = 1001;
    pub const LEASE_HELD: status_code_t = 1002;
    pub const LEASE_EXPIRED: status_code_t = 1003;
    pub const SEQUENCE_EXHAUSTED: status_code_t = 1004;
}

/// RPC status codes (2xxx).
pub mod RPCCode {
    use super::status_code_t;

    pub const INVALID_MESSAGE: status_code_t = 2000;
    pub const TIMEOUT: status_code_t = 2005;
    pub const INVALID_ADDR: status_code_t = 2006;
    pub const SEND_FAILED: status_code_t = 2007;
    pub const INVALID_SERVICE_ID: status_code_t = 2008;
    pub const INVALID_METHOD_ID: status_code_t = 2009;
    pub const SOCKET_ERROR: status_code_t = 2010;
    pub const LISTEN_FAILED: status_code_t = 2011;
    pub const SOCKET_CLOSED: status_code_t = 2013;
    pub const CONNECT_FAILED: status_code_t = 2014;
}

/// Metadata cache status codes (3xxx).
pub mod CacheCode {
    use super::status_code_t;

    pub const ENTRY_NOT_FOUND: status_code_t = 3000;
    pub const STALE_ENTRY: status_code_t = 3001;
    pub const NOT_OWNER: status_code_t = 3002;
    pub const ALLOC_FAILED: status_code_t = 3003;
    pub const INVALID_ENTRY: status_code_t = 3004;
}

/// Chunkserver status codes (4xxx).
pub mod ChunkCode {
    use super::status_code_t;

    pub const CHUNK_NOT_FOUND: status_code_t = 4000;
    pub const CHUNK_EXISTS: status_code_t = 4001;
    pub const OUT_OF_BOUNDS: status_code_t = 4002;
    pub const STALE_VERSION: status_code_t = 4003;
    pub const VERSION_NOT_FOUND: status_code_t = 4004;
    pub const WRITE_NOT_STAGED: status_code_t = 4005;
    pub const DELETE_CONFLICT: status_code_t = 4006;
    pub const REPLICATION_FAILED: status_code_t = 4007;
    pub const INVALID_VERSION: status_code_t = 4008;
    pub const COMMIT_CONFLICT: status_code_t = 4009;
}

/// Produce a human-readable name for a status code.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::IO_ERROR => "IoError",
        StatusCode::UNKNOWN => "Unknown",

        CoordCode::KEY_NOT_FOUND => "Coord::KeyNotFound",
        CoordCode::CAS_FAILED => "Coord::CasFailed",
        CoordCode::LEASE_HELD => "Coord::LeaseHeld",
        CoordCode::LEASE_EXPIRED => "Coord::LeaseExpired",
        CoordCode::SEQUENCE_EXHAUSTED => "Coord::SequenceExhausted",

        RPCCode::INVALID_MESSAGE => "RPC::InvalidMessage",
        RPCCode::TIMEOUT => "RPC::Timeout",
        RPCCode::INVALID_ADDR => "RPC::InvalidAddr",
        RPCCode::SEND_FAILED => "RPC::SendFailed",
        RPCCode::INVALID_SERVICE_ID => "RPC::InvalidServiceId",
        RPCCode::INVALID_METHOD_ID => "RPC::InvalidMethodId",
        RPCCode::SOCKET_ERROR => "RPC::SocketError",
        RPCCode::LISTEN_FAILED => "RPC::ListenFailed",
        RPCCode::SOCKET_CLOSED => "RPC::SocketClosed",
        RPCCode::CONNECT_FAILED => "RPC::ConnectFailed",

        CacheCode::ENTRY_NOT_FOUND => "Cache::EntryNotFound",
        CacheCode::STALE_ENTRY => "Cache::StaleEntry",
        CacheCode::NOT_OWNER => "Cache::NotOwner",
        CacheCode::ALLOC_FAILED => "Cache::AllocFailed",
        CacheCode::INVALID_ENTRY => "Cache::InvalidEntry",

        ChunkCode::CHUNK_NOT_FOUND => "Chunk::NotFound",
        ChunkCode::CHUNK_EXISTS => "Chunk::Exists",
        ChunkCode::OUT_OF_BOUNDS => "Chunk::OutOfBounds",
        ChunkCode::STALE_VERSION => "Chunk::StaleVersion",
        ChunkCode::VERSION_NOT_FOUND => "Chunk::VersionNotFound",
        ChunkCode::WRITE_NOT_STAGED => "Chunk::WriteNotStaged",
        ChunkCode::DELETE_CONFLICT => "Chunk::DeleteConflict",
        ChunkCode::REPLICATION_FAILED => "Chunk::ReplicationFailed",
        ChunkCode::INVALID_VERSION => "Chunk::InvalidVersion",
        ChunkCode::COMMIT_CONFLICT => "Chunk::CommitConflict",

        _ => "Unrecognized",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_names() {
        assert_eq!(to_string(StatusCode::OK), "OK");
        assert_eq!(to_string(ChunkCode::STALE_VERSION), "Chunk::StaleVersion");
        assert_eq!(to_string(CacheCode::NOT_OWNER), "Cache::NotOwner");
        assert_eq!(to_string(RPCCode::TIMEOUT), "RPC::Timeout");
        assert_eq!(to_string(54321), "Unrecognized");
    }

    #[test]
    fn test_code_spaces_disjoint() {
        assert!(CoordCode::KEY_NOT_FOUND >= 1000 && CoordCode::KEY_NOT_FOUND < 2000);
        assert!(RPCCode::TIMEOUT >= 2000 && RPCCode::TIMEOUT < 3000);
        assert!(CacheCode::STALE_ENTRY >= 3000 && CacheCode::STALE_ENTRY < 4000);
        assert!(ChunkCode::OUT_OF_BOUNDS >= 4000 && ChunkCode::OUT_OF_BOUNDS < 5000);
    }
}
