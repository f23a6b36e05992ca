//! Request Dispatcher: decodes transport-agnostic request messages, routes
//! `metadata`/`slice`/`health` requests, and encodes responses. Never
//! panics on client input — malformed or unknown messages become an
//! `error` response (spec.md §4.5, §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::slicer::{Slicer, SliceResponse};
use crate::viewport::{compute_slice_params, Viewport};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Request {
    MetadataRequest,
    SliceRequest(Viewport),
    HealthRequest,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Response {
    MetadataResponse { max_rows: u64, max_cols: u64 },
    SliceResponse(SliceResponseWire),
    HealthResponse { total_rows: u64, total_cols: u64, alive: bool },
    Error { message: String },
}

/// `SliceResponse` flattened into the wire shape spec.md §6 describes
/// (`startRow`, `rowCount`, ... alongside `kind`).
#[derive(Debug, Serialize)]
struct SliceResponseWire {
    start_row: u64,
    row_count: u64,
    start_col: u64,
    col_count: u64,
    col_letters: Vec<String>,
    cells_by_row: Vec<Vec<String>>,
}

impl From<SliceResponse> for SliceResponseWire {
    fn from(r: SliceResponse) -> Self {
        Self {
            start_row: r.start_row,
            row_count: r.row_count,
            start_col: r.start_col,
            col_count: r.col_count,
            col_letters: r.col_letters,
            cells_by_row: r.cells_by_row,
        }
    }
}

/// Decodes, routes, and encodes one request message. Always returns a JSON
/// string — even on malformed input — so the transport never has to
/// special-case failures.
pub fn dispatch(message: &str, slicer: &Slicer) -> String {
    let response = match decode(message) {
        Ok(Request::MetadataRequest) => {
            debug!("metadata_request");
            Response::MetadataResponse {
                max_rows: slicer.total_rows(),
                max_cols: slicer.n_cols(),
            }
        }
        Ok(Request::SliceRequest(viewport)) => {
            let params = compute_slice_params(&viewport, slicer.total_rows(), slicer.n_cols());
            debug!(?params, "slice_request");
            let slice = slicer.get_slice(
                params.start_row as i64,
                params.row_count as i64,
                params.start_col as i64,
                params.col_count as i64,
            );
            Response::SliceResponse(slice.into())
        }
        Ok(Request::HealthRequest) => Response::HealthResponse {
            total_rows: slicer.total_rows(),
            total_cols: slicer.n_cols(),
            alive: true,
        },
        Err(source) => {
            warn!(error = %source, "rejecting malformed or unknown request");
            Response::Error {
                message: format!("malformed or unknown request: {source}"),
            }
        }
    };

    serde_json::to_string(&response).expect("response types always serialize")
}

fn decode(message: &str) -> Result<Request, DispatchError> {
    serde_json::from_str(message).map_err(DispatchError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn slicer_for(bytes: &[u8]) -> (tempfile::NamedTempFile, Slicer) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        let index = Arc::new(crate::index::build(f.path(), 2).unwrap());
        let slicer = Slicer::open(f.path(), index, 2).unwrap();
        (f, slicer)
    }

    const SEED: &[u8] =
        b"Hamburg;12.0\nBulawayo;8.9\nPalembang;38.8\nSt. John's;15.2\nCracow;12.6\n";

    #[test]
    fn metadata_request_reports_totals() {
        let (_f, slicer) = slicer_for(SEED);
        let reply = dispatch(r#"{"kind":"metadata_request"}"#, &slicer);
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["kind"], "metadata_response");
        assert_eq!(v["max_rows"], 5);
        assert_eq!(v["max_cols"], 2);
    }

    #[test]
    fn slice_request_round_trips_through_viewport_translator() {
        let (_f, slicer) = slicer_for(SEED);
        let req = serde_json::json!({
            "kind": "slice_request",
            "screen_width": 1000,
            "screen_height": 480,
            "horizontal_buffer": 2,
            "vertical_buffer": 5,
            "default_column_width": 100,
            "default_row_height": 24,
            "scroll_left": 0,
            "scroll_top": 0,
        });
        let reply = dispatch(&req.to_string(), &slicer);
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["kind"], "slice_response");
        assert_eq!(v["row_count"], 5);
        assert_eq!(v["cells_by_row"][0][0], "Hamburg");
    }

    #[test]
    fn unknown_kind_yields_error_response_not_a_crash() {
        let (_f, slicer) = slicer_for(SEED);
        let reply = dispatch(r#"{"kind":"frobnicate"}"#, &slicer);
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["kind"], "error");
        assert!(v["message"].as_str().unwrap().contains("unknown variant"));
    }

    #[test]
    fn malformed_json_yields_error_response_not_a_crash() {
        let (_f, slicer) = slicer_for(SEED);
        let reply = dispatch("not json at all", &slicer);
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["kind"], "error");
    }

    #[test]
    fn health_request_reports_liveness() {
        let (_f, slicer) = slicer_for(SEED);
        let reply = dispatch(r#"{"kind":"health_request"}"#, &slicer);
        let v: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(v["kind"], "health_response");
        assert_eq!(v["alive"], true);
    }
}
