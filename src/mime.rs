/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::path::Path;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Guesses the `(type, subtype)` pair of a file from its extension.
pub fn guess_mime_type(filename: impl AsRef<Path>) -> Option<(String, String)> {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| (mime.type_().to_string(), mime.subtype().to_string()))
}

/// Same as [`guess_mime_type`], as a `type/subtype` string falling back to
/// `application/octet-stream`.
pub fn mime_type_or_default(filename: impl AsRef<Path>) -> String {
    guess_mime_type(filename)
        .map(|(main, sub)| format!("{main}/{sub}"))
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}
