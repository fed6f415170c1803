pub mod backend;

pub use backend::{
    HttpMonitoringClient, MediaUploader, MonitoringRecord, MonitoringRecordRequest,
    MonitoringRecordSink, RecordMetadata, SnapshotUpload, UploadedMedia,
};
