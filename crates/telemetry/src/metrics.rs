use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Plate Recognition Metrics ====
    pub static ref PLATE_RECOGNITIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "plate_recognitions_total",
                "Total number of plate recognition calls by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLATE_RECOGNITION_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "plate_recognition_latency_seconds",
                "End-to-end latency of a plate recognition call",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLATE_VARIANTS_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "plate_variants_processed_total",
                "Total number of image variants passed to the OCR reader",
            ),
            &["variant"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLATE_CANDIDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "plate_candidates_total",
                "Total number of plate candidates accepted per grammar",
            ),
            &["grammar"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLATE_EARLY_EXITS: IntCounter = {
        let metric = IntCounter::new(
            "plate_early_exits_total",
            "Recognition calls that skipped remaining variants after a perfect candidate",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLATE_OCR_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "plate_ocr_inference_seconds",
                "Time spent in OCR model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Access Control Metrics ====
    pub static ref ACCESS_DECISIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "access_decisions_total",
                "Total number of access decisions by action and result",
            ),
            &["action", "result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_metrics_accessible() {
        PLATE_RECOGNITIONS.with_label_values(&["detected"]).inc();
        assert!(PLATE_RECOGNITIONS.with_label_values(&["detected"]).get() >= 1);

        PLATE_VARIANTS_PROCESSED.with_label_values(&["GRAY"]).inc();
        PLATE_CANDIDATES.with_label_values(&["COL_CARRO"]).inc();
        PLATE_EARLY_EXITS.inc();
        PLATE_RECOGNITION_LATENCY.observe(0.2);
        PLATE_OCR_INFERENCE_TIME
            .with_label_values(&["CPU"])
            .observe(0.01);
        assert!(PLATE_EARLY_EXITS.get() >= 1);
    }

    #[test]
    fn test_access_metrics_accessible() {
        ACCESS_DECISIONS
            .with_label_values(&["entry", "authorized"])
            .inc();
        assert!(
            ACCESS_DECISIONS
                .with_label_values(&["entry", "authorized"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_encode_metrics() {
        PLATE_RECOGNITIONS.with_label_values(&["not_detected"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("plate_recognitions_total"));
    }
}
