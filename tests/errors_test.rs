#[cfg(test)]
mod error_tests {
    use std::error::Error;
    use uvc_manager::errors::{ErrorKind, UvcError};

    #[test]
    fn test_invalid_argument_display() {
        let error = UvcError::invalid_argument("device identifier is empty");
        assert_eq!(error.to_string(), "Invalid argument: device identifier is empty");
        assert!(error.is_contract_violation());
    }

    #[test]
    fn test_permission_errors_name_the_device() {
        let denied = UvcError::PermissionDenied("camA".to_string());
        assert!(denied.to_string().contains("Permission denied"));
        assert!(denied.to_string().contains("camA"));

        let timeout = UvcError::PermissionTimeout("camA".to_string());
        assert!(timeout.to_string().contains("timed out"));
    }

    #[test]
    fn test_native_call_failure() {
        let error = UvcError::native("close_device", "camA", "usb reset");
        assert_eq!(
            error.to_string(),
            "Native call close_device failed for device camA: usb reset"
        );
        assert_eq!(error.kind(), ErrorKind::NativeCallFailed);
        assert!(!error.is_contract_violation());
    }

    #[test]
    fn test_unsupported_resolution_display() {
        let error = UvcError::UnsupportedResolution {
            device_id: "camA".to_string(),
            width: 800,
            height: 600,
        };
        assert!(error.to_string().contains("800x600"));
        assert!(error.to_string().contains("camA"));
    }

    #[test]
    fn test_error_debug_format() {
        let error = UvcError::OpenFailed("camA".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("OpenFailed"));
        assert!(debug_str.contains("camA"));
    }

    #[test]
    fn test_error_implements_error_trait() {
        let error = UvcError::MonitorClosed;
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_all_error_variants() {
        let errors = vec![
            (UvcError::invalid_argument("x"), ErrorKind::InvalidArgument),
            (
                UvcError::MalformedDescriptor {
                    device_id: "d".into(),
                    reason: "r".into(),
                },
                ErrorKind::MalformedDescriptor,
            ),
            (
                UvcError::MalformedCatalog {
                    device_id: "d".into(),
                    reason: "r".into(),
                },
                ErrorKind::MalformedCatalog,
            ),
            (UvcError::OpenFailed("d".into()), ErrorKind::OpenFailed),
            (
                UvcError::UnsupportedResolution {
                    device_id: "d".into(),
                    width: 1,
                    height: 1,
                },
                ErrorKind::UnsupportedResolution,
            ),
            (UvcError::PermissionDenied("d".into()), ErrorKind::PermissionDenied),
            (UvcError::PermissionTimeout("d".into()), ErrorKind::PermissionTimeout),
            (UvcError::native("open_device", "d", "r"), ErrorKind::NativeCallFailed),
            (UvcError::RenderTargetFailed("r".into()), ErrorKind::RenderTargetFailed),
            (UvcError::Config("r".into()), ErrorKind::Config),
            (UvcError::MonitorClosed, ErrorKind::MonitorClosed),
        ];

        for (error, kind) in errors {
            assert!(!error.to_string().is_empty());
            assert_eq!(error.kind(), kind);
            assert_eq!(
                error.is_contract_violation(),
                kind == ErrorKind::InvalidArgument
            );
        }
    }

    #[test]
    fn test_error_clone_and_eq() {
        let error = UvcError::native("stop_preview", "camA", "stalled");
        assert_eq!(error.clone(), error);
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UvcError>();
    }
}
