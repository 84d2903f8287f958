//! Client configuration types.

/// Tunables injected into [`Space`](crate::space::Space) construction.
///
/// The core reads no environment or files; callers build this and pass it
/// in.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Rows a cursor requests per batch when the caller does not pick a
    /// batch size.
    pub cursor_batch_size: u32,
    /// Name of the select procedure on the clustered proxy.
    pub proxy_select_function: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cursor_batch_size: 100,
            proxy_select_function: "orbit.select".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.cursor_batch_size, 100);
        assert_eq!(config.proxy_select_function, "orbit.select");
    }
}
