//! Fuzz target: `Response::decode` / `Request::decode`
//!
//! Any payload must decode to a typed error or a message; a message that
//! decodes must survive re-encoding unchanged.
//!
//! cargo fuzz run fuzz_response_decode

#![no_main]

use badgehub::protocol::{Request, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(resp) = Response::decode(data) {
        let again = Response::decode(&resp.encode()).expect("re-encoded response decodes");
        assert_eq!(again, resp);
    }
    if let Ok(req) = Request::decode(data) {
        let again = Request::decode(&req.encode()).expect("re-encoded request decodes");
        assert_eq!(again, req);
    }
});
