//! Register and memory access for wave threads.

use tracing::warn;

use crate::error::{Result, TargetError};
use crate::host::RegisterDesc;
use crate::library::{AddressSpace, ProcessId, RegisterProperties, Status, StopReasons};
use crate::ptid::Ptid;

use super::GpuTarget;

impl GpuTarget {
    fn register_desc(&self, ptid: Ptid, regno: usize) -> Result<RegisterDesc> {
        self.core
            .register_desc(ptid, regno)
            .ok_or_else(|| TargetError::Invariant(format!("no register #{regno} for {ptid}")))
    }

    fn register_range(&self, ptid: Ptid, regno: Option<usize>) -> std::ops::Range<usize> {
        match regno {
            Some(regno) => regno..regno + 1,
            None => 0..self.core.register_count(ptid),
        }
    }

    /// Read one register (or all of them) into the core's register cache.
    pub fn fetch_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()> {
        if !ptid.is_wave() {
            self.beneath.fetch_registers(ptid, regno)?;
            return Ok(());
        }

        let wave = ptid.wave_id();
        for regno in self.register_range(ptid, regno) {
            let desc = self.register_desc(ptid, regno)?;
            let mut raw = vec![0u8; desc.size];
            match self.lib.read_register(wave, desc.id, 0, &mut raw) {
                Ok(()) => self.core.supply_register(ptid, regno, &raw),
                Err(Status::RegisterNotAvailable) => {}
                Err(status) => {
                    warn!(register = %desc.name, regno, %status, "couldn't read register");
                }
            }
        }
        Ok(())
    }

    /// Write one register (or all of them) from the core's register cache.
    pub fn store_registers(&mut self, ptid: Ptid, regno: Option<usize>) -> Result<()> {
        if !ptid.is_wave() {
            self.beneath.store_registers(ptid, regno)?;
            return Ok(());
        }

        let wave = ptid.wave_id();
        for regno in self.register_range(ptid, regno) {
            let desc = self.register_desc(ptid, regno)?;
            let raw = self.core.collect_register(ptid, regno);

            // The value that sticks may differ from the one written.
            if desc.properties.contains(RegisterProperties::READONLY_BITS) {
                self.core.invalidate_register(ptid, regno);
            }
            // E.g. writing VCC changes STATUS.VCCZ.
            if desc
                .properties
                .contains(RegisterProperties::INVALIDATE_VOLATILE)
            {
                for other in 0..self.core.register_count(ptid) {
                    let volatile = self
                        .core
                        .register_desc(ptid, other)
                        .is_some_and(|d| d.properties.contains(RegisterProperties::VOLATILE));
                    if volatile {
                        self.core.invalidate_register(ptid, other);
                    }
                }
            }

            if let Err(status) = self.lib.write_register(wave, desc.id, 0, &raw) {
                warn!(register = %desc.name, regno, %status, "couldn't write register");
            }
        }
        Ok(())
    }

    /// Read global memory as seen by `ptid` (lane 0 for a wave).
    pub fn read_memory(&mut self, ptid: Ptid, address: u64, buf: &mut [u8]) -> Result<usize> {
        if !ptid.is_wave() {
            return Ok(self.beneath.read_memory(ptid, address, buf)?);
        }
        let process = self.wave_process(ptid, address)?;
        self.lib
            .read_memory(process, ptid.wave_id(), 0, AddressSpace::Global, address, buf)
            .map_err(|status| TargetError::MemoryAccess { address, status })
    }

    /// Write global memory as seen by `ptid` (lane 0 for a wave).
    pub fn write_memory(&mut self, ptid: Ptid, address: u64, data: &[u8]) -> Result<usize> {
        if !ptid.is_wave() {
            return Ok(self.beneath.write_memory(ptid, address, data)?);
        }
        let process = self.wave_process(ptid, address)?;
        self.lib
            .write_memory(process, ptid.wave_id(), 0, AddressSpace::Global, address, data)
            .map_err(|status| TargetError::MemoryAccess { address, status })
    }

    fn wave_process(&self, ptid: Ptid, address: u64) -> Result<ProcessId> {
        self.sessions
            .get(ptid.pid())
            .and_then(|session| session.process())
            .ok_or(TargetError::MemoryAccess {
                address,
                status: Status::InvalidProcessId,
            })
    }

    pub fn stopped_by_sw_breakpoint(&self, ptid: Ptid) -> bool {
        if !ptid.is_wave() {
            return self.beneath.stopped_by_sw_breakpoint(ptid);
        }
        self.lib
            .wave_stop_reasons(ptid.wave_id())
            .is_ok_and(|reasons| reasons.contains(StopReasons::BREAKPOINT))
    }

    pub fn stopped_by_hw_breakpoint(&self, ptid: Ptid) -> bool {
        if !ptid.is_wave() {
            return self.beneath.stopped_by_hw_breakpoint(ptid);
        }
        false
    }

    pub fn stopped_by_watchpoint(&self, ptid: Ptid) -> bool {
        if !ptid.is_wave() {
            return self.beneath.stopped_by_watchpoint(ptid);
        }
        false
    }
}
