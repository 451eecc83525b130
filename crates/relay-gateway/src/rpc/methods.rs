//! Method names understood by the primary.

pub const PUSH_FILE: &str = "pushFile";
pub const GET_FILE: &str = "getFile";
pub const GET_FILE_METADATA: &str = "getFileMetadata";
pub const DELETE_FILE: &str = "deleteFile";
pub const GET_FILE_NAMES: &str = "getFileNames";
pub const GET_DEFINITION_FILE: &str = "getDefinitionFile";
pub const GET_ALL_FILES: &str = "getFiles";
pub const GET_ALL_FILE_METADATA: &str = "getAllFileMetadata";
pub const CALCULATE_RAM: &str = "calculateRam";
pub const GET_ALL_SERVERS: &str = "getAllServers";
pub const GET_SAVE_FILE: &str = "getSaveFile";

/// Acknowledgement returned by write calls.
pub const ACK: &str = "OK";

/// Every method the facade issues.
pub const ALL: &[&str] = &[
    PUSH_FILE,
    GET_FILE,
    GET_FILE_METADATA,
    DELETE_FILE,
    GET_FILE_NAMES,
    GET_DEFINITION_FILE,
    GET_ALL_FILES,
    GET_ALL_FILE_METADATA,
    CALCULATE_RAM,
    GET_ALL_SERVERS,
    GET_SAVE_FILE,
];
