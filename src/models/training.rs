//! Training models

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct TrainRequest {
    /// Omit to use the configured source; a present value must not be blank
    #[validate(
        length(min = 1, max = 4096, message = "data_path must be 1-4096 characters"),
        custom(function = "not_blank")
    )]
    pub data_path: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("data_path must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainResponse {
    pub status: String,
    pub model_path: String,
}

impl TrainResponse {
    pub fn trained(model_path: String) -> Self {
        Self {
            status: "trained".to_string(),
            model_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_data_path_is_invalid() {
        for blank in ["", "   ", "\t"] {
            let req = TrainRequest { data_path: Some(blank.to_string()) };
            assert!(req.validate().is_err(), "{blank:?} should be rejected");
        }

        assert!(TrainRequest::default().validate().is_ok());
        assert!(TrainRequest { data_path: Some("data/train.csv".into()) }.validate().is_ok());
    }
}
