//! Error classification table for `DrainExecutor` failures (SPEC_FULL.md
//! §4.5.6). Turns any failure into a `(status, err_code, retriable)` triple
//! that the executor persists on the job row.

use crate::clients::CustodianError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: &'static str,
    pub err_code: String,
    pub retriable: bool,
}

/// Dispatches a `CustodianClient` failure to its classifier. Most errors are
/// generic transfer failures, but a custodian can also surface that a wallet
/// failed reputation or hit its withdrawal limit mid-execution (not only at
/// ingest time), which route to their own fixed statuses instead.
pub fn classify(err: &CustodianError) -> Classification {
    match err.code.as_str() {
        "reputation-failed" => classify_reputation_failure(),
        "reputation-service-failure" => classify_reputation_service_failure(),
        "exceeded-withdrawal-limit" => classify_exceeded_withdrawal_limit(),
        _ => classify_custodian_error(err),
    }
}

pub fn classify_custodian_error(err: &CustodianError) -> Classification {
    let retriable = err.retriable
        || matches!(
            err.code.as_str(),
            "failed_client" | "failed_response_body" | "failed_response_unmarshal"
        );
    Classification {
        status: "failed",
        err_code: err.code.to_lowercase(),
        retriable,
    }
}

pub fn classify_reputation_failure() -> Classification {
    Classification {
        status: "reputation-failed",
        err_code: "reputation-failed".to_string(),
        retriable: false,
    }
}

pub fn classify_reputation_service_failure() -> Classification {
    Classification {
        status: "failed",
        err_code: "reputation-service-failure".to_string(),
        retriable: true,
    }
}

pub fn classify_exceeded_withdrawal_limit() -> Classification {
    Classification {
        status: "exceeded-withdrawal-limit",
        err_code: "exceeded-withdrawal-limit".to_string(),
        retriable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custodian_error_lowercases_code() {
        let err = CustodianError {
            code: "MARSHAL_TRANSFER".to_string(),
            retriable: false,
        };
        let c = classify_custodian_error(&err);
        assert_eq!(c.err_code, "marshal_transfer");
        assert!(!c.retriable);
    }

    #[test]
    fn failed_client_is_always_retriable() {
        let err = CustodianError {
            code: "failed_client".to_string(),
            retriable: false,
        };
        assert!(classify_custodian_error(&err).retriable);
    }

    #[test]
    fn reputation_and_withdrawal_limit_set_matching_status() {
        assert_eq!(classify_reputation_failure().status, "reputation-failed");
        assert_eq!(
            classify_exceeded_withdrawal_limit().status,
            "exceeded-withdrawal-limit"
        );
    }

    #[test]
    fn dispatch_routes_reputation_and_withdrawal_codes_to_fixed_classifiers() {
        let reputation_err = CustodianError {
            code: "reputation-failed".to_string(),
            retriable: false,
        };
        assert_eq!(classify(&reputation_err), classify_reputation_failure());

        let limit_err = CustodianError {
            code: "exceeded-withdrawal-limit".to_string(),
            retriable: false,
        };
        assert_eq!(classify(&limit_err), classify_exceeded_withdrawal_limit());

        let generic_err = CustodianError {
            code: "create_transfer".to_string(),
            retriable: true,
        };
        assert_eq!(classify(&generic_err), classify_custodian_error(&generic_err));
    }
}
