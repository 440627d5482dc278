//! Client-facing artifacts: config text and QR rendering.

use qrcode::QrCode;
use qrcode::render::svg;

use crate::error::{DeviceError, Result};

/// Parameters for rendering a client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfigParams<'a> {
    /// The client's private key (never persisted by the core).
    pub private_key: &'a str,
    /// The client's allocated address, single-host CIDR.
    pub client_address: &'a str,
    /// The server's public key.
    pub server_public_key: &'a str,
    /// Public endpoint, `host:port`.
    pub endpoint: &'a str,
    /// DNS server handed to the client.
    pub dns: &'a str,
}

/// Renders the client-side tunnel configuration in the daemon's own format.
#[must_use]
pub fn client_config(params: &ClientConfigParams<'_>) -> String {
    format!(
        "[Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {address}\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {server_key}\n\
         Endpoint = {endpoint}\n\
         AllowedIPs = 0.0.0.0/0,::/0\n",
        private_key = params.private_key,
        address = params.client_address,
        dns = params.dns,
        server_key = params.server_public_key,
        endpoint = params.endpoint,
    )
}

/// Renders the peer block appended to the server's persisted config file.
#[must_use]
pub fn server_peer_block(public_key: &str, client_address: &str) -> String {
    format!("\n[Peer]\nPublicKey = {public_key}\nAllowedIPs = {client_address}\n")
}

/// Renders the config text as a scannable SVG QR image.
///
/// # Errors
///
/// Returns [`DeviceError::Artifact`] when the text does not fit a QR code.
pub fn qr_svg(config_text: &str) -> Result<String> {
    let code = QrCode::new(config_text.as_bytes()).map_err(|e| DeviceError::Artifact(e.to_string()))?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .build())
}
