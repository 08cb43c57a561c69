use crate::bridge::error::BridgeError;
use crate::bridge::machine::{Bridge, BridgeStats};
use crate::config::Config;
use crate::controller::Capabilities;
use crate::device::{HidrawSource, SysfsLocator};
use crate::output::{EventSink, SinkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Locates the controller, opens it, creates the virtual device through
/// `create_sink` and runs the loop until cancellation or failure.
///
/// Nothing is created when the controller cannot be found, and the virtual
/// device only exists once the source is open.
pub async fn launch<F>(
    config: &Config,
    locator: &SysfsLocator,
    create_sink: F,
    cancel: CancellationToken,
) -> Result<BridgeStats, BridgeError>
where
    F: FnOnce(&str, &Capabilities) -> Result<Box<dyn EventSink>, SinkError>,
{
    let device = &config.device;
    let path = locator.locate()?.ok_or(BridgeError::SourceNotFound {
        vendor_id: device.vendor_id,
        product_id: device.product_id,
    })?;

    let source = HidrawSource::open(&path).map_err(|source| BridgeError::SourceOpen {
        path: path.clone(),
        source,
    })?;

    let caps = Capabilities::for_variant(device.variant);
    let sink = create_sink(&device.name, &caps).map_err(|e| {
        debug!("Virtual device unavailable: {}", e);
        BridgeError::SinkCreation(e)
    })?;

    let running = Bridge::create(sink, config.bridge_settings()).start(Box::new(source), path);
    let terminated = running.run(cancel).await.terminate();
    info!("All device handles released");
    terminated.outcome()
}
