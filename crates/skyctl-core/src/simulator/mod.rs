// ── Device server simulator ──
//
// An in-process INDIGO-like server with one CCD and one mount, driven
// over an in-memory `Link`. Used by the integration tests and by
// `skyctl --simulate`. All simulated state lives in a single task;
// timed actions (connecting, slewing, exposing) report back to it
// through an internal channel.

mod devices;
mod property;

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use skyctl_api::{ClientMessage, Link, PropertyPerm, PropertyState, ServerMessage, blob};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::astro;
use crate::error::CoreError;
use crate::mount::PierSide;
use crate::pointing::PointingModel;
use crate::session::Session;

pub use devices::{CCD_DEVICE, MOUNT_DEVICE};
use devices::PARK_HOUR_ANGLE;
use property::SimProperty;

const INTERNAL_CHANNEL_SIZE: usize = 64;

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Fixed local sidereal time, hours.
    pub lst: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub connect_delay: Duration,
    /// Duration of every GOTO and park slew.
    pub slew_time: Duration,
    pub ccd_width: u32,
    pub ccd_height: u32,
    /// Pointing error the mount makes on every slew.
    pub pointing_error: Option<PointingModel>,
    /// Property names whose writes are swallowed without any reply.
    pub ignored: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            lst: 0.0,
            latitude: 49.261_872_611,
            longitude: 0.0,
            connect_delay: Duration::from_millis(100),
            slew_time: Duration::from_millis(200),
            ccd_width: 1600,
            ccd_height: 1200,
            pointing_error: None,
            ignored: Vec::new(),
        }
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Running simulator. The server task also stops on its own once the
/// client half of the link is dropped.
pub struct Simulator {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Simulator {
    /// Start a simulator and return the client half of its link.
    pub fn spawn(config: SimulatorConfig) -> (Link, Self) {
        let (link, peer) = Link::pair();
        let cancel = CancellationToken::new();
        let server = Server::new(config, peer.outbound);
        let handle = tokio::spawn(server.run(peer.inbound, cancel.clone()));
        (link, Self { cancel, handle })
    }

    /// Start a simulator and connect `session` to it.
    pub async fn attach(session: &Session, config: SimulatorConfig) -> Result<Self, CoreError> {
        let (link, simulator) = Self::spawn(config);
        session.connect_with(link).await?;
        Ok(simulator)
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "simulator task failed");
        }
    }
}

// ── Server task ─────────────────────────────────────────────────────

enum Internal {
    Connected { device: String },
    ParkDone,
    SlewDone { ra: f64, dec: f64 },
    ExposureDone,
}

enum Write {
    Switch(Vec<(String, bool)>),
    Number(Vec<(String, f64)>),
    Text(Vec<(String, String)>),
}

struct Motion {
    element: String,
    started: Instant,
}

struct Server {
    config: SimulatorConfig,
    outbound: mpsc::Sender<ServerMessage>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    properties: IndexMap<(String, String), SimProperty>,
    /// Mount position `(ra, dec)` outside of slews.
    position: (f64, f64),
    park: (f64, f64),
    motion_ra: Option<Motion>,
    motion_dec: Option<Motion>,
}

impl Server {
    fn new(config: SimulatorConfig, outbound: mpsc::Sender<ServerMessage>) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_SIZE);
        let properties = devices::ccd(&config)
            .into_iter()
            .chain(devices::mount(&config))
            .map(|p| ((p.device.clone(), p.name.clone()), p))
            .collect();
        let park = (PARK_HOUR_ANGLE, 0.0);
        let mut server = Self {
            position: (astro::normalize_hours(config.lst - park.0), park.1),
            config,
            outbound,
            internal_tx,
            internal_rx,
            properties,
            park,
            motion_ra: None,
            motion_dec: None,
        };
        server.sync_pier_side();
        server
    }

    async fn run(mut self, mut inbound: mpsc::Receiver<ClientMessage>, cancel: CancellationToken) {
        debug!("simulator started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(event) = self.internal_rx.recv() => self.on_internal(event).await,
                msg = inbound.recv() => match msg {
                    Some(msg) => self.on_client(msg).await,
                    None => break,
                },
            }
        }
        debug!("simulator stopped");
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn send(&self, msg: ServerMessage) {
        if self.outbound.send(msg).await.is_err() {
            trace!("simulator client went away");
        }
    }

    fn prop(&self, device: &str, name: &str) -> Option<&SimProperty> {
        self.properties.get(&(device.to_owned(), name.to_owned()))
    }

    fn prop_mut(&mut self, device: &str, name: &str) -> Option<&mut SimProperty> {
        self.properties.get_mut(&(device.to_owned(), name.to_owned()))
    }

    /// Set a property's state and send the update.
    async fn publish(&mut self, device: &str, name: &str, state: PropertyState, message: Option<String>) {
        let Some(prop) = self.prop_mut(device, name) else {
            return;
        };
        prop.state = state;
        prop.message = message;
        let msg = prop.update();
        self.send(msg).await;
    }

    async fn alert(&mut self, device: &str, name: &str, message: &str) {
        debug!(device, property = name, message, "simulator rejected write");
        self.publish(device, name, PropertyState::Alert, Some(message.to_owned()))
            .await;
    }

    fn after(&self, delay: Duration, event: Internal) {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                trace!("simulator stopped before a timed action finished");
            }
        });
    }

    fn is_connected(&self, device: &str) -> bool {
        self.prop(device, "CONNECTION")
            .is_some_and(|p| p.get_switch("CONNECTED") && p.state == PropertyState::Ok)
    }

    fn is_parked(&self) -> bool {
        self.prop(MOUNT_DEVICE, "MOUNT_PARK")
            .is_some_and(|p| p.get_switch("PARKED"))
    }

    async fn set_position(&mut self, ra: f64, dec: f64, state: PropertyState) {
        self.position = (astro::normalize_hours(ra), dec.clamp(-90.0, 90.0));
        let (ra, dec) = self.position;
        if let Some(p) = self.prop_mut(MOUNT_DEVICE, "MOUNT_EQUATORIAL_COORDINATES") {
            p.set_number("RA", ra);
            p.set_number("DEC", dec);
        }
        self.publish(MOUNT_DEVICE, "MOUNT_EQUATORIAL_COORDINATES", state, None)
            .await;
        self.sync_pier_side();
        if let Some(msg) = self.prop(MOUNT_DEVICE, "MOUNT_SIDE_OF_PIER").map(SimProperty::update) {
            self.send(msg).await;
        }
    }

    fn sync_pier_side(&mut self) {
        let east = astro::pier_side_for(self.config.lst, self.position.0) == PierSide::East;
        if let Some(p) = self.prop_mut(MOUNT_DEVICE, "MOUNT_SIDE_OF_PIER") {
            p.set_switch(if east { "EAST" } else { "WEST" }, true);
        }
    }

    /// Where a slew to `(ra, dec)` actually ends up.
    fn achieved(&self, ra: f64, dec: f64) -> (f64, f64) {
        match &self.config.pointing_error {
            Some(model) => {
                let lst = self.config.lst;
                let pier = astro::pier_side_for(lst, ra);
                let (dra, ddec) = model.correction(astro::hour_angle(lst, ra), dec, pier);
                (astro::normalize_hours(ra + dra), dec + ddec)
            }
            None => (ra, dec),
        }
    }

    // ── Client frames ───────────────────────────────────────────────

    async fn on_client(&mut self, msg: ClientMessage) {
        trace!(?msg, "simulator received");
        match msg {
            ClientMessage::GetProperties(get) => {
                let defs: Vec<ServerMessage> = self
                    .properties
                    .values()
                    .filter(|p| get.device.as_deref().is_none_or(|d| d == p.device))
                    .filter(|p| get.name.as_deref().is_none_or(|n| n == p.name))
                    .map(SimProperty::definition)
                    .collect();
                for def in defs {
                    self.send(def).await;
                }
            }
            ClientMessage::EnableBlob(e) => debug!(device = %e.device, mode = %e.value, "BLOB mode"),
            ClientMessage::NewSwitchVector(v) => {
                let items = v.items.into_iter().map(|i| (i.name, i.value)).collect();
                self.on_write(&v.device, &v.name, Write::Switch(items)).await;
            }
            ClientMessage::NewNumberVector(v) => {
                let items = v.items.into_iter().map(|i| (i.name, i.value)).collect();
                self.on_write(&v.device, &v.name, Write::Number(items)).await;
            }
            ClientMessage::NewTextVector(v) => {
                let items = v.items.into_iter().map(|i| (i.name, i.value)).collect();
                self.on_write(&v.device, &v.name, Write::Text(items)).await;
            }
        }
    }

    async fn on_write(&mut self, device: &str, name: &str, write: Write) {
        if self.config.ignored.iter().any(|n| n == name) {
            debug!(device, property = name, "ignoring write");
            return;
        }
        let Some(prop) = self.prop(device, name) else {
            self.send(ServerMessage::Message(skyctl_api::protocol::ServerNotice {
                device: Some(device.to_owned()),
                message: format!("unknown property {name}"),
            }))
            .await;
            return;
        };
        if prop.perm == PropertyPerm::ReadOnly {
            self.alert(device, name, "property is read-only").await;
            return;
        }
        if name != "CONNECTION" && !self.is_connected(device) {
            self.alert(device, name, "device is not connected").await;
            return;
        }
        let moves = matches!(
            name,
            "MOUNT_MOTION_DEC" | "MOUNT_MOTION_RA" | "MOUNT_EQUATORIAL_COORDINATES"
        );
        if moves && self.is_parked() {
            self.alert(device, name, "mount is parked").await;
            return;
        }

        if let Some(prop) = self.prop_mut(device, name) {
            match write {
                Write::Switch(items) => {
                    for (item, on) in items {
                        prop.set_switch(&item, on);
                    }
                }
                Write::Number(items) => {
                    for (item, value) in items {
                        prop.set_number(&item, value);
                    }
                }
                Write::Text(items) => {
                    for (item, value) in items {
                        prop.set_text(&item, &value);
                    }
                }
            }
        }

        match name {
            "CONNECTION" => self.on_connection(device).await,
            "CCD_EXPOSURE" => self.on_exposure().await,
            "MOUNT_PARK" => self.on_park().await,
            "MOUNT_PARK_SET" => self.on_park_set().await,
            "MOUNT_MOTION_DEC" | "MOUNT_MOTION_RA" => self.on_motion(name).await,
            "MOUNT_EQUATORIAL_COORDINATES" => self.on_coordinates().await,
            _ => self.publish(device, name, PropertyState::Ok, None).await,
        }
    }

    // ── Behaviours ──────────────────────────────────────────────────

    async fn on_connection(&mut self, device: &str) {
        let connect = self
            .prop(device, "CONNECTION")
            .is_some_and(|p| p.get_switch("CONNECTED"));
        if connect {
            self.publish(device, "CONNECTION", PropertyState::Busy, None).await;
            self.after(
                self.config.connect_delay,
                Internal::Connected {
                    device: device.to_owned(),
                },
            );
        } else {
            self.publish(device, "CONNECTION", PropertyState::Ok, None).await;
        }
    }

    async fn on_exposure(&mut self) {
        let seconds = self
            .prop(CCD_DEVICE, "CCD_EXPOSURE")
            .and_then(|p| p.get_number("EXPOSURE"))
            .unwrap_or(0.0)
            .max(0.0);
        let Ok(duration) = Duration::try_from_secs_f64(seconds) else {
            self.alert(CCD_DEVICE, "CCD_EXPOSURE", "exposure time out of range").await;
            return;
        };
        self.publish(CCD_DEVICE, "CCD_EXPOSURE", PropertyState::Busy, None).await;
        self.after(duration, Internal::ExposureDone);
    }

    async fn finish_exposure(&mut self) {
        let mode = self
            .prop(CCD_DEVICE, "CCD_UPLOAD_MODE")
            .and_then(SimProperty::first_on)
            .unwrap_or("CLIENT")
            .to_owned();
        let payload = self.frame_payload();

        if mode == "LOCAL" || mode == "BOTH" {
            let (dir, prefix) = self
                .prop(CCD_DEVICE, "CCD_LOCAL_MODE")
                .map(|p| {
                    (
                        p.get_text("DIR").unwrap_or_default().to_owned(),
                        p.get_text("PREFIX").unwrap_or_default().to_owned(),
                    )
                })
                .unwrap_or_default();
            let path = PathBuf::from(dir).join(format!("{prefix}.fits"));
            let written = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| std::fs::write(&path, &payload));
            if let Err(e) = written {
                let message = format!("cannot write {}: {e}", path.display());
                self.alert(CCD_DEVICE, "CCD_EXPOSURE", &message).await;
                return;
            }
            debug!(path = %path.display(), "simulator saved frame");
        }

        if mode == "CLIENT" || mode == "BOTH" {
            if let Some(p) = self.prop_mut(CCD_DEVICE, "CCD_IMAGE") {
                p.set_blob("IMAGE", ".fits", blob::encode_inline(&payload));
            }
            self.publish(CCD_DEVICE, "CCD_IMAGE", PropertyState::Ok, None).await;
        }

        if let Some(p) = self.prop_mut(CCD_DEVICE, "CCD_EXPOSURE") {
            p.set_number("EXPOSURE", 0.0);
        }
        self.publish(CCD_DEVICE, "CCD_EXPOSURE", PropertyState::Ok, None).await;
    }

    /// Stand-in image bytes: a header-like text block describing the frame.
    fn frame_payload(&self) -> Vec<u8> {
        let ccd = |name: &str, el: &str| {
            self.prop(CCD_DEVICE, name)
                .and_then(|p| p.get_number(el))
                .unwrap_or_default()
        };
        let frame_type = self
            .prop(CCD_DEVICE, "CCD_FRAME_TYPE")
            .and_then(SimProperty::first_on)
            .unwrap_or("LIGHT");
        format!(
            "SIMPLE  = T\nNAXIS1  = {}\nNAXIS2  = {}\nXBINNING= {}\nYBINNING= {}\nFRAME   = '{frame_type}'\nEND\n",
            ccd("CCD_INFO", "WIDTH") / ccd("CCD_BIN", "HORIZONTAL").max(1.0),
            ccd("CCD_INFO", "HEIGHT") / ccd("CCD_BIN", "VERTICAL").max(1.0),
            ccd("CCD_BIN", "HORIZONTAL"),
            ccd("CCD_BIN", "VERTICAL"),
        )
        .into_bytes()
    }

    async fn on_park(&mut self) {
        if self.is_parked() {
            self.publish(MOUNT_DEVICE, "MOUNT_PARK", PropertyState::Busy, None).await;
            self.after(self.config.slew_time, Internal::ParkDone);
        } else {
            self.publish(MOUNT_DEVICE, "MOUNT_PARK", PropertyState::Ok, None).await;
        }
    }

    async fn finish_park(&mut self) {
        let (ha, dec) = self.park;
        self.set_position(self.config.lst - ha, dec, PropertyState::Ok).await;
        self.publish(MOUNT_DEVICE, "MOUNT_PARK", PropertyState::Ok, None).await;
    }

    async fn on_park_set(&mut self) {
        let current = self
            .prop(MOUNT_DEVICE, "MOUNT_PARK_SET")
            .and_then(SimProperty::first_on)
            .map(str::to_owned);
        match current.as_deref() {
            Some("CURRENT") => {
                self.park = (self.config.lst - self.position.0, self.position.1);
            }
            Some("DEFAULT") => self.park = (PARK_HOUR_ANGLE, 0.0),
            _ => {}
        }
        debug!(hour_angle = self.park.0, dec = self.park.1, "park position set");
        self.publish(MOUNT_DEVICE, "MOUNT_PARK_SET", PropertyState::Ok, None).await;
    }

    async fn on_motion(&mut self, name: &str) {
        let now = Instant::now();
        let active = self
            .prop(MOUNT_DEVICE, name)
            .and_then(SimProperty::first_on)
            .map(str::to_owned);
        let previous = if name == "MOUNT_MOTION_DEC" {
            self.motion_dec.take()
        } else {
            self.motion_ra.take()
        };
        if let Some(motion) = previous {
            self.apply_motion(&motion, now).await;
        }
        match active {
            Some(element) => {
                let motion = Motion { element, started: now };
                if name == "MOUNT_MOTION_DEC" {
                    self.motion_dec = Some(motion);
                } else {
                    self.motion_ra = Some(motion);
                }
                self.publish(MOUNT_DEVICE, name, PropertyState::Busy, None).await;
            }
            None => self.publish(MOUNT_DEVICE, name, PropertyState::Ok, None).await,
        }
    }

    async fn apply_motion(&mut self, motion: &Motion, now: Instant) {
        let rate = match self
            .prop(MOUNT_DEVICE, "MOUNT_SLEW_RATE")
            .and_then(SimProperty::first_on)
        {
            Some("GUIDE") => 0.004,
            Some("CENTERING") => 0.05,
            Some("MAX") => 2.0,
            _ => 0.5,
        };
        let degrees = rate * (now - motion.started).as_secs_f64();
        let (ra, dec) = self.position;
        let (ra, dec) = match motion.element.as_str() {
            "NORTH" => (ra, dec + degrees),
            "SOUTH" => (ra, dec - degrees),
            "WEST" => (ra - degrees / 15.0, dec),
            "EAST" => (ra + degrees / 15.0, dec),
            _ => (ra, dec),
        };
        debug!(direction = %motion.element, degrees, "simulated motion");
        self.set_position(ra, dec, PropertyState::Ok).await;
    }

    async fn on_coordinates(&mut self) {
        let Some((ra, dec)) = self
            .prop(MOUNT_DEVICE, "MOUNT_EQUATORIAL_COORDINATES")
            .and_then(|p| Some((p.get_number("RA")?, p.get_number("DEC")?)))
        else {
            return;
        };
        let mode = self
            .prop(MOUNT_DEVICE, "MOUNT_ON_COORDINATES_SET")
            .and_then(SimProperty::first_on)
            .unwrap_or("TRACK")
            .to_owned();
        if mode == "SYNC" {
            self.set_position(ra, dec, PropertyState::Ok).await;
            return;
        }
        let (ra, dec) = self.achieved(ra, dec);
        self.publish(MOUNT_DEVICE, "MOUNT_EQUATORIAL_COORDINATES", PropertyState::Busy, None)
            .await;
        self.after(self.config.slew_time, Internal::SlewDone { ra, dec });
    }

    // ── Timed actions ───────────────────────────────────────────────

    async fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Connected { device } => {
                debug!(%device, "simulated device connected");
                self.publish(&device, "CONNECTION", PropertyState::Ok, None).await;
            }
            Internal::ParkDone => self.finish_park().await,
            Internal::SlewDone { ra, dec } => self.set_position(ra, dec, PropertyState::Ok).await,
            Internal::ExposureDone => self.finish_exposure().await,
        }
    }
}
