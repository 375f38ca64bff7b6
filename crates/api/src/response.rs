use serde::Serialize;

/// `{ "data": T }` envelope used by every JSON endpoint except the inbox
/// listings, which carry their paging fields at the top level.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
