use shared::metrics_defs::{MetricDef, MetricType};

pub const GATEWAY_REQUESTS: MetricDef = MetricDef {
    name: "gateway.requests",
    metric_type: MetricType::Counter,
    description: "Inbound relay requests. Tagged with route, status.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "gateway.request.duration",
    metric_type: MetricType::Histogram,
    description: "Inbound relay request duration in seconds. Tagged with route, status.",
};

pub const ALL_METRICS: &[MetricDef] = &[GATEWAY_REQUESTS, REQUEST_DURATION];
