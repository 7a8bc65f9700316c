// # nsupdate Dispatcher
//
// Applies a batch by rendering an nsupdate instruction script and running
// the external `nsupdate` executable on it.
//
// ## Script Format
//
// ```text
// server ns1.example.org
// zone dyn.example.org
// update delete example.dyn.example.org. A
// update add example.dyn.example.org. 300 A 203.0.113.7
// send
// ```
//
// ## Process
//
// 1. Write the script to a private temporary file (mode 0600)
// 2. Run `nsupdate -k <keyfile> <script>` with a bounded timeout
// 3. Remove the temporary file, whatever the outcome

use async_trait::async_trait;
use std::io::Write as _;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::NsUpdateConfig;
use crate::error::{Error, Result};
use crate::traits::{UpdateBatch, UpdateDispatcher};

const SCRIPT_PREFIX: &str = "mydyns";

/// DNS record type for an address
pub fn record_type(ip: &IpAddr) -> &'static str {
    match ip.to_canonical() {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    }
}

/// Render the instruction script for a batch
pub fn render_script(server: &str, zone: &str, ttl: u32, batch: &UpdateBatch) -> String {
    let zone = zone.trim_end_matches('.');
    let mut script = String::new();

    script.push_str(&format!("server {}\n", server));
    script.push_str(&format!("zone {}\n", zone));
    for (hostname, ip) in batch {
        let ip = ip.to_canonical();
        let rtype = record_type(&ip);
        script.push_str(&format!("update delete {}.{}. {}\n", hostname, zone, rtype));
        script.push_str(&format!(
            "update add {}.{}. {} {} {}\n",
            hostname, zone, ttl, rtype, ip
        ));
    }
    script.push_str("send\n");

    script
}

/// Dispatcher driving the external nsupdate executable
#[derive(Debug, Clone)]
pub struct NsUpdateDispatcher {
    config: NsUpdateConfig,
}

impl NsUpdateDispatcher {
    /// Create a dispatcher from configuration
    pub fn new(config: NsUpdateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Script for a batch under this dispatcher's configuration
    pub fn script(&self, batch: &UpdateBatch) -> String {
        render_script(
            &self.config.server,
            self.config.zone_name(),
            self.config.ttl,
            batch,
        )
    }

    async fn run(&self, script_path: &std::path::Path) -> Result<()> {
        let child = Command::new(&self.config.exe)
            .arg("-k")
            .arg(&self.config.keyfile)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::dispatch(format!(
                    "failed to start {}: {}",
                    self.config.exe.display(),
                    e
                ))
            })?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::dispatch(format!("nsupdate timed out after {:?}", timeout)))?
            .map_err(|e| Error::dispatch(format!("failed to wait for nsupdate: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::dispatch(format!(
                "nsupdate exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl UpdateDispatcher for NsUpdateDispatcher {
    async fn dispatch(&self, batch: &UpdateBatch) -> Result<()> {
        let script = self.script(batch);

        // Removed when dropped, on every return path below
        let mut file = tempfile::Builder::new()
            .prefix(SCRIPT_PREFIX)
            .tempfile()
            .map_err(|e| Error::dispatch(format!("failed to create script file: {}", e)))?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::dispatch(format!("failed to write script file: {}", e)))?;

        info!(
            "Processing {} updates in {}",
            batch.len(),
            file.path().display()
        );
        debug!("nsupdate script:\n{}", script);

        self.run(file.path()).await?;

        info!("Completed update {}", file.path().display());
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "nsupdate"
    }
}
