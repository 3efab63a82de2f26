//! Macros for recording pipeline metrics.

/// Increments a metric with an optional label value.
#[macro_export]
macro_rules! inc {
    ($metric:ident) => {
        #[cfg(feature = "metrics")]
        $crate::metrics::$metric.inc();
    };
    ($metric:ident, $labels:expr) => {
        #[cfg(feature = "metrics")]
        $crate::metrics::$metric.with_label_values($labels).inc();
    };
}

/// Sets a metric value.
#[macro_export]
macro_rules! set {
    ($metric:ident, $value:expr) => {
        #[cfg(feature = "metrics")]
        $crate::metrics::$metric.set($value);
    };
}
