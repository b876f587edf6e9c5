// license:BSD-3-Clause

/// JSON export for parsed file metadata.
pub(crate) trait Jsonlize: serde::Serialize {
    fn get_json(&self) -> String {
        serde_json::to_string(&self).unwrap_or_default()
    }
}
