use shared::metrics_defs::{MetricDef, MetricType};

pub const PLATFORM_CALLS: MetricDef = MetricDef {
    name: "platform.calls",
    metric_type: MetricType::Counter,
    description: "Platform API method calls. Tagged with method, outcome.",
};

pub const PLATFORM_UPLOADS: MetricDef = MetricDef {
    name: "platform.uploads",
    metric_type: MetricType::Counter,
    description: "Raw binary uploads to platform upload servers. Tagged with field, outcome.",
};

pub const RESOURCE_DOWNLOADS: MetricDef = MetricDef {
    name: "resource.downloads",
    metric_type: MetricType::Counter,
    description: "Caller-supplied resource downloads. Tagged with kind, outcome.",
};

pub const VIDEO_FALLBACK: MetricDef = MetricDef {
    name: "platform.video_fallback",
    metric_type: MetricType::Counter,
    description: "Video sends retried as documents after a group authorization failure",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PLATFORM_CALLS,
    PLATFORM_UPLOADS,
    RESOURCE_DOWNLOADS,
    VIDEO_FALLBACK,
];
