//! Configuration validation.

use crate::schema::Config;

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_client(config, &mut result);
        Self::validate_sampling(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        let host = config.server.host.as_str();
        if host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        } else if !matches!(host, "127.0.0.1" | "localhost" | "::1") {
            result.add_warning(ValidationWarning::new(
                "server.host",
                format!("Relay bound to non-loopback host '{}' is reachable from the network", host),
            ));
        }
    }

    fn validate_client(config: &Config, result: &mut ValidationResult) {
        let url = &config.client.server_url;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            result.add_error(ValidationError::new(
                "client.server_url",
                "server_url must start with ws:// or wss://",
            ));
        }

        if config.client.request_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "client.request_timeout_secs",
                "request_timeout_secs must be greater than 0",
            ));
        }

        if config.client.reconnect_delay_secs == 0 && config.client.max_reconnect_attempts > 0 {
            result.add_error(ValidationError::new(
                "client.reconnect_delay_secs",
                "reconnect_delay_secs must be greater than 0 when reconnection is enabled",
            ));
        }
    }

    fn validate_sampling(config: &Config, result: &mut ValidationResult) {
        let sampling = &config.sampling;

        if sampling.max_tokens == 0 {
            result.add_error(ValidationError::new(
                "sampling.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if sampling.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "sampling.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        for (name, value) in [
            ("sampling.intelligence_priority", sampling.intelligence_priority),
            ("sampling.speed_priority", sampling.speed_priority),
        ] {
            if !(0.0..=1.0).contains(&value) {
                result.add_error(ValidationError::new(
                    name,
                    format!("priority must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }

        if sampling.system_prompt.trim().is_empty() {
            result.add_warning(ValidationWarning::new(
                "sampling.system_prompt",
                "system_prompt is empty, the AI receives no role instructions",
            ));
        }
    }
}
