//! Mass-storage class: Bulk-Only Transport over two bulk endpoints.
//!
//! Commands are decoded and answered by [`ScsiTarget`]; this module only
//! moves packets and sectors between the endpoints and the shared disk.

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
use embassy_usb::driver::{Driver, Endpoint, EndpointError, EndpointIn, EndpointOut};
use embassy_usb::{Builder, Handler};
use embedded_storage::nor_flash::NorFlash;

use super::device::{storage_enabled, EJECTED};
use super::scsi::{
    Cbw, Command, Csw, CswStatus, Outcome, ScsiTarget, Sense, RESPONSE_CAPACITY,
};
use crate::config::{DISK_SECTOR_COUNT, DISK_SECTOR_SIZE};
use crate::disk::DiskLock;

const CLASS_MSC: u8 = 0x08;
const SUBCLASS_SCSI: u8 = 0x06;
const PROTOCOL_BOT: u8 = 0x50;

const REQ_GET_MAX_LUN: u8 = 0xFE;
const REQ_BULK_ONLY_RESET: u8 = 0xFF;

const PACKET_SIZE: usize = 64;

/// Answers the class-specific control requests on the storage interface.
pub struct MscControl {
    interface: AtomicU8,
}

impl MscControl {
    pub const fn new() -> Self {
        Self {
            interface: AtomicU8::new(0),
        }
    }

    fn accepts(&self, req: &Request) -> bool {
        req.request_type == RequestType::Class
            && req.recipient == Recipient::Interface
            && req.index == self.interface.load(Ordering::Relaxed) as u16
    }
}

impl Handler for MscControl {
    fn control_out(&mut self, req: Request, _data: &[u8]) -> Option<OutResponse> {
        if !self.accepts(&req) {
            return None;
        }
        match req.request {
            REQ_BULK_ONLY_RESET => {
                debug!("msc: bulk-only reset");
                Some(OutResponse::Accepted)
            }
            _ => Some(OutResponse::Rejected),
        }
    }

    fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
        if !self.accepts(&req) {
            return None;
        }
        match req.request {
            REQ_GET_MAX_LUN if !buf.is_empty() => {
                buf[0] = 0;
                Some(InResponse::Accepted(&buf[..1]))
            }
            _ => Some(InResponse::Rejected),
        }
    }
}

/// The storage interface's bulk endpoints.
pub struct MscClass<'d, D: Driver<'d>> {
    read_ep: D::EndpointOut,
    write_ep: D::EndpointIn,
}

impl<'d, D: Driver<'d>> MscClass<'d, D> {
    pub fn new(builder: &mut Builder<'d, D>, control: &'d mut MscControl) -> Self {
        let mut function = builder.function(CLASS_MSC, SUBCLASS_SCSI, PROTOCOL_BOT);
        let mut interface = function.interface();
        control
            .interface
            .store(interface.interface_number().0, Ordering::Relaxed);
        let mut alt = interface.alt_setting(CLASS_MSC, SUBCLASS_SCSI, PROTOCOL_BOT, None);
        let read_ep = alt.endpoint_bulk_out(PACKET_SIZE as u16);
        let write_ep = alt.endpoint_bulk_in(PACKET_SIZE as u16);
        drop(function);

        builder.handler(control);

        Self { read_ep, write_ep }
    }

    /// Serve the host forever. Must run in its own task.
    pub async fn run<F>(mut self, disk: &'static DiskLock<CriticalSectionRawMutex, F>) -> !
    where
        F: NorFlash,
    {
        info!("MSC task started");
        let mut target = ScsiTarget::new(DISK_SECTOR_COUNT as u32, DISK_SECTOR_SIZE as u32);

        loop {
            self.read_ep.wait_enabled().await;
            if let Err(EndpointError::Disabled) = self.serve(&mut target, disk).await {
                debug!("msc: endpoint disabled");
            }
        }
    }

    async fn serve<F: NorFlash>(
        &mut self,
        target: &mut ScsiTarget,
        disk: &DiskLock<CriticalSectionRawMutex, F>,
    ) -> Result<(), EndpointError> {
        let mut packet = [0u8; PACKET_SIZE];
        loop {
            let n = self.read_ep.read(&mut packet).await?;
            let Some(cbw) = Cbw::parse(&packet[..n]) else {
                warn!("msc: invalid CBW ({} bytes)", n);
                continue;
            };

            target.set_medium_present(storage_enabled());
            let command = Command::parse(cbw.cdb());
            let mut response = [0u8; RESPONSE_CAPACITY];
            let expected = cbw.data_len as usize;

            let (status, moved) = match target.respond(&command, &mut response) {
                Outcome::Data(len) => {
                    let len = len.min(expected);
                    self.send(&response[..len], len < expected).await?;
                    (CswStatus::Passed, len)
                }
                Outcome::Passed => (CswStatus::Passed, 0),
                Outcome::Failed => {
                    if cbw.data_in && expected > 0 {
                        self.write_ep.write(&[]).await?;
                    }
                    (CswStatus::Failed, 0)
                }
                Outcome::Ejected => {
                    EJECTED.signal(());
                    (CswStatus::Passed, 0)
                }
                Outcome::Read { lba, blocks } => {
                    let blocks = (blocks as usize).min(expected / DISK_SECTOR_SIZE);
                    self.read_sectors(target, disk, lba, blocks).await?
                }
                Outcome::Write { lba, blocks } => {
                    let blocks = (blocks as usize).min(expected / DISK_SECTOR_SIZE);
                    self.write_sectors(target, disk, lba, blocks).await?
                }
            };

            let csw = Csw {
                tag: cbw.tag,
                residue: (expected - moved) as u32,
                status,
            };
            self.write_ep.write(&csw.to_bytes()).await?;
        }
    }

    /// Send `data` in packets, ending with a zero-length packet when the
    /// transfer is short and would otherwise end on a packet boundary.
    async fn send(&mut self, data: &[u8], short: bool) -> Result<(), EndpointError> {
        for chunk in data.chunks(PACKET_SIZE) {
            self.write_ep.write(chunk).await?;
        }
        if short && data.len() % PACKET_SIZE == 0 {
            self.write_ep.write(&[]).await?;
        }
        Ok(())
    }

    async fn read_sectors<F: NorFlash>(
        &mut self,
        target: &mut ScsiTarget,
        disk: &DiskLock<CriticalSectionRawMutex, F>,
        lba: u32,
        blocks: usize,
    ) -> Result<(CswStatus, usize), EndpointError> {
        let mut sector = [0u8; DISK_SECTOR_SIZE];
        for i in 0..blocks {
            let lba = lba + i as u32;
            if disk.lock(|d| d.borrow().read(lba, 0, &mut sector)).is_err() {
                target.fail(Sense::READ_ERROR);
                self.write_ep.write(&[]).await?;
                return Ok((CswStatus::Failed, i * DISK_SECTOR_SIZE));
            }
            self.send(&sector, false).await?;
        }
        Ok((CswStatus::Passed, blocks * DISK_SECTOR_SIZE))
    }

    async fn write_sectors<F: NorFlash>(
        &mut self,
        target: &mut ScsiTarget,
        disk: &DiskLock<CriticalSectionRawMutex, F>,
        lba: u32,
        blocks: usize,
    ) -> Result<(CswStatus, usize), EndpointError> {
        let mut sector = [0u8; DISK_SECTOR_SIZE];
        let mut status = CswStatus::Passed;
        for i in 0..blocks {
            let mut filled = 0;
            while filled < DISK_SECTOR_SIZE {
                let end = (filled + PACKET_SIZE).min(DISK_SECTOR_SIZE);
                filled += self.read_ep.read(&mut sector[filled..end]).await?;
            }
            // After a failure the rest of the data stage is still drained.
            if status == CswStatus::Passed {
                let lba = lba + i as u32;
                if disk.lock(|d| d.borrow_mut().write(lba, 0, &sector)).is_err() {
                    target.fail(Sense::WRITE_FAULT);
                    status = CswStatus::Failed;
                }
            }
        }
        Ok((status, blocks * DISK_SECTOR_SIZE))
    }
}
