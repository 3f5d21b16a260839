/// GET: fetch the cell's state snapshot.
pub const STATE: &str = "/state";

/// POST: instruct the cell to perform work; the response body enumerates
/// whatever the cell refused.
pub const PERFORM: &str = "/work";
