// UDP motion source
//
// Binds a UDP socket and treats each datagram as one sample, encoded either
// as a JSON object `{"x":..,"y":..,"z":..}` or as text `x,y,z`.

use super::{parse_sample, MotionSource, SourceError, SourceMetadata, SourceResult};
use crate::types::Sample;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct UdpSource {
    bind_addr: String,
    buffer_size: usize,
    socket: Option<UdpSocket>,
    malformed: u64,
}

impl UdpSource {
    pub fn new(bind_addr: String, buffer_size: usize) -> Self {
        Self {
            bind_addr,
            buffer_size,
            socket: None,
            malformed: 0,
        }
    }

    /// Address the socket is actually bound to (resolves port 0)
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn parse_datagram(data: &[u8]) -> SourceResult<Sample> {
        let text = std::str::from_utf8(data)
            .map_err(|e| SourceError::Parse(format!("Datagram is not UTF-8: {}", e)))?;
        parse_sample(text)
    }
}

#[async_trait]
impl MotionSource for UdpSource {
    async fn connect(&mut self) -> SourceResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(&self.bind_addr)
            .await
            .map_err(|e| SourceError::Network(format!("UDP bind failed: {}", e)))?;

        info!("UDP motion source bound to {}", self.bind_addr);
        self.socket = Some(socket);
        Ok(())
    }

    async fn start(&mut self, sender: mpsc::Sender<Sample>) -> SourceResult<()> {
        self.connect().await?;
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| SourceError::Network("UDP socket not bound".to_string()))?;

        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let len = socket
                .recv(&mut buffer)
                .await
                .map_err(|e| SourceError::Network(format!("UDP receive failed: {}", e)))?;

            match Self::parse_datagram(&buffer[..len]) {
                Ok(sample) => {
                    if sender.send(sample).await.is_err() {
                        info!("Sample receiver closed, stopping UDP source");
                        return Ok(());
                    }
                }
                Err(e) => {
                    // Keep receiving; one bad packet is not fatal.
                    self.malformed += 1;
                    warn!(malformed = self.malformed, "Dropping UDP datagram: {}", e);
                }
            }
        }
    }

    async fn stop(&mut self) -> SourceResult<()> {
        info!("Stopping UDP motion source");
        self.socket = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source_type: "udp".to_string(),
            sample_rate: 0.0,
            properties: [("bind_address".to_string(), self.bind_addr.clone())]
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_receives_samples_and_skips_garbage() {
        let mut source = UdpSource::new("127.0.0.1:0".to_string(), 256);
        source.connect().await.unwrap();
        let addr = source.local_addr().unwrap();
        assert!(source.is_connected());

        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = source.start(tx).await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"0.1,0.2,0.3", addr).await.unwrap();
        client.send_to(b"not a sample", addr).await.unwrap();
        client
            .send_to(br#"{"x":1.0,"y":0.0,"z":-1.0}"#, addr)
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, Sample::new(0.1, 0.2, 0.3));

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, Sample::new(1.0, 0.0, -1.0));
    }
}
