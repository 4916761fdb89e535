//! # Protocol Names
//!
//! Header and query parameter names of the LRA coordination protocol, shared
//! by the inbound service and the outbound participant client.

/// Header carrying the LRA URI a request belongs to.
pub const LRA_HTTP_CONTEXT_HEADER: &str = "Long-Running-Action";

/// Header carrying the URI of the LRA that just ended (complete/compensate/after).
pub const LRA_HTTP_ENDED_CONTEXT_HEADER: &str = "Long-Running-Action-Ended";

/// Header carrying the parent LRA URI of a nested LRA.
pub const LRA_HTTP_PARENT_CONTEXT_HEADER: &str = "Long-Running-Action-Parent";

/// Header carrying a participant's recovery URI.
pub const LRA_HTTP_RECOVERY_HEADER: &str = "Long-Running-Action-Recovery";

/// Query parameter: free-form client label on `start`.
pub const CLIENT_ID_PARAM: &str = "ClientID";

/// Query parameter: time limit in milliseconds on `start` and `join`.
pub const TIME_LIMIT_PARAM: &str = "TimeLimit";

/// Query parameter: parent LRA on `start`.
pub const PARENT_LRA_PARAM: &str = "ParentLRA";

/// Query parameter: status filter on the list endpoint.
pub const STATUS_PARAM: &str = "Status";
