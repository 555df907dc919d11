//! Application constants for the interval-data ingester
//!
//! This module contains the channel-code alphabets, default storage
//! locations and column names used throughout the ingester.

// =============================================================================
// Channel Codes
// =============================================================================

/// Stream-type characters (first character of a two-character channel code)
pub const STREAM_TYPES: [char; 22] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'J', 'K', 'L', 'P', 'Q', 'R', 'S', 'T', 'U', 'G', 'H', 'Y',
    'M', 'W', 'V', 'Z',
];

/// Channel-number characters (second character of a two-character channel code)
pub const CHANNEL_NUMBERS: [char; 35] = [
    '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Separator between the channel code and the unit token in a column name
pub const CHANNEL_SEPARATOR: char = '_';

/// Separator between device identity and channel code in a monitoring-point key
pub const MONITOR_POINT_SEPARATOR: char = '-';

/// Unit value emitted when a channel's unit cannot be resolved
pub const INVALID_UNIT: &str = "-1";

// =============================================================================
// Table Columns
// =============================================================================

/// Interval start column present in every parsed table
pub const TIME_COLUMN: &str = "t_start";

/// Interval end column (NEM12 tables only)
pub const TIME_END_COLUMN: &str = "t_end";

/// Quality method column (NEM12 tables only)
pub const QUALITY_COLUMN: &str = "quality_method";

/// Output record columns, in emission order
pub mod record_columns {
    pub const SENSOR_ID: &str = "sensorId";
    pub const TIMESTAMP: &str = "ts";
    pub const VALUE: &str = "val";
    pub const UNIT: &str = "unit";
    pub const INGESTED_AT: &str = "its";
}

/// Timestamp format for emitted records (second precision, no zone marker)
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp fragment used in emitted object names
pub const OBJECT_NAME_TIMESTAMP_FORMAT: &str = "%Y_%b_%dT%H_%M_%S_%f";

// =============================================================================
// Storage Locations
// =============================================================================

/// Bucket holding the inbox, routing areas, mapping table and metrics
pub const DEFAULT_INGEST_BUCKET: &str = "sbm-file-ingester";

/// Key of the sensor mapping table inside the ingest bucket
pub const DEFAULT_MAPPING_KEY: &str = "nem12_mappings.json";

/// Routing area prefixes
pub mod areas {
    pub const INBOX: &str = "newTBP/";
    pub const PROCESSED: &str = "newP/";
    pub const IRRECOVERABLE: &str = "newIrrevFiles/";
    pub const PARSE_ERROR: &str = "newParseErr/";
}

/// Bucket and prefix receiving normalised record tables
pub const DEFAULT_OUTPUT_BUCKET: &str = "hudibucketsrc";
pub const DEFAULT_OUTPUT_PREFIX: &str = "sensorDataFiles/";

/// Fixed destination of the usage-and-spend raw copy
pub const DEFAULT_RAW_COPY_BUCKET: &str = "gegoptimareports";
pub const DEFAULT_RAW_COPY_KEY: &str = "usageAndSpendReports/racvUsageAndSpend.csv";

/// Prefix for metrics documents inside the ingest bucket
pub const DEFAULT_METRICS_PREFIX: &str = "metrics/";

/// Run-date keys are computed in this offset (AEST)
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 600;

// =============================================================================
// Parser Dispatch
// =============================================================================

/// Version of the default vendor parser order. Bump whenever the order changes.
pub const PARSER_ORDER_VERSION: u32 = 1;

/// Filename marker that routes a file past the Envizi/RACV adapters
pub const OPTIMA_GENERATION_MARKER: &str = "OptimaGenerationData";

/// Filename marker required by the usage-and-spend adapter
pub const USAGE_AND_SPEND_MARKER: &str = "RACV-Usage and Spend Report";

/// Site marker on the second line of Green Square ComX exports
pub const COMX_SITE_MARKER: &str = "ComX510_Green_Square";

// =============================================================================
// Environment
// =============================================================================

pub const ENV_STORE_ROOT: &str = "SBM_INGESTER_STORE_ROOT";
pub const ENV_UTC_OFFSET_MINUTES: &str = "SBM_INGESTER_UTC_OFFSET_MINUTES";
