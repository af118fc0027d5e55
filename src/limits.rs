// Hard caps enforced at the edges. Exceeding any of these is a client error,
// not a capacity planning knob.

pub const MAX_TENANTS: usize = 128;
pub const MAX_TENANT_NAME_LEN: usize = 64;
pub const MAX_BUSINESSES_PER_TENANT: usize = 4096;
pub const MAX_BOOKINGS_PER_BUSINESS: usize = 65_536;
/// Business display name length.
pub const MAX_NAME_LEN: usize = 128;
/// Client identifier length (RFC 5321 mailbox upper bound).
pub const MAX_CLIENT_LEN: usize = 254;
pub const MAX_IN_CLAUSE_IDS: usize = 64;
/// A booking never spans more than one day.
pub const MAX_DURATION_MINUTES: u32 = 1440;
/// Accepted calendar range for booking dates.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;
