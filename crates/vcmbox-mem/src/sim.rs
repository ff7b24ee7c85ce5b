//! In-process stand-in for the VideoCore firmware.
//!
//! Answers the same property tags as the real firmware, backed by a bump
//! allocator over a byte arena, and interprets a small subset of the
//! VideoCore IV scalar instruction set so execute requests return real
//! results:
//!
//! ```text
//! 011o ooou uuuu dddd   mov/add/mul/sub rd, #u5   (o = 0/1/2/3)
//! 0x005a                rts
//! 0x0001                nop
//! ```

use std::collections::BTreeMap;

use tracing::trace;
use vcmbox_message::{Message, Tag, RESPONSE_PARTIAL, RESPONSE_SUCCESS};
use vcmbox_transport::{Mailbox, Result as TransportResult};

use crate::error::{MemError, Result};
use crate::exec::EXECUTE_REGISTERS;
use crate::flags::{AllocFlags, InitMode};
use crate::handle::BusAddress;

/// Bus alias the simulator hands out (uncached, like `CacheMode::Direct`).
pub const BUS_ALIAS: u32 = 0xC000_0000;

/// Answer to a firmware revision query.
pub const FIRMWARE_REVISION: u32 = 0x5f0a_1c2e;

/// Answer to a board revision query.
pub const BOARD_REVISION: u32 = 0x00a0_2082;

const DEFAULT_CAPACITY: usize = 16 * 1024 * 1024;
const STEP_LIMIT: usize = 1 << 16;
const RTS: u16 = 0x005a;
const NOP: u16 = 0x0001;

#[derive(Debug, Clone, Copy)]
struct Block {
    offset: usize,
    size: usize,
    locked: bool,
}

impl Block {
    fn contains(&self, offset: usize, len: usize) -> bool {
        offset >= self.offset && offset + len <= self.offset + self.size
    }
}

/// Simulated firmware implementing [`Mailbox`].
#[derive(Debug)]
pub struct Simulator {
    memory: Vec<u8>,
    capacity: usize,
    blocks: BTreeMap<u32, Block>,
    next_handle: u32,
    fail_next_allocation: bool,
    requests: Vec<(u32, u32)>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Simulator with an arena of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memory: Vec::new(),
            capacity,
            blocks: BTreeMap::new(),
            next_handle: 1,
            fail_next_allocation: false,
            requests: Vec::new(),
        }
    }

    /// Make the next allocate request return handle zero.
    pub fn fail_next_allocation(&mut self) {
        self.fail_next_allocation = true;
    }

    /// Number of exchanges answered so far.
    pub fn exchanges(&self) -> usize {
        self.requests.len()
    }

    /// Every request seen, as `(tag, first argument word)`.
    pub fn requests(&self) -> &[(u32, u32)] {
        &self.requests
    }

    /// Allocations not yet released.
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Copy `data` into locked memory at `bus`, the way a caller would through
    /// a mapped segment.
    pub fn write(&mut self, bus: BusAddress, data: &[u8]) -> Result<()> {
        let offset = self.offset_of(bus);
        if self.locked_block(offset, data.len()).is_none() {
            return Err(MemError::NotLocked(bus));
        }
        self.memory[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read `len` bytes of locked memory at `bus`.
    pub fn read(&self, bus: BusAddress, len: usize) -> Option<&[u8]> {
        let offset = self.offset_of(bus);
        self.locked_block(offset, len)?;
        Some(&self.memory[offset..offset + len])
    }

    fn offset_of(&self, bus: BusAddress) -> usize {
        (bus.0 & !BusAddress::ALIAS_MASK) as usize
    }

    fn locked_block(&self, offset: usize, len: usize) -> Option<Block> {
        self.blocks
            .values()
            .find(|b| b.locked && b.contains(offset, len))
            .copied()
    }

    fn allocate(&mut self, size: u32, alignment: u32, flags: u32) -> u32 {
        if std::mem::take(&mut self.fail_next_allocation) || size == 0 {
            return 0;
        }
        let Some(flags) = AllocFlags::from_bits(flags) else {
            return 0;
        };
        let alignment = alignment.max(1) as usize;
        if !alignment.is_power_of_two() {
            return 0;
        }

        let offset = self.memory.len().next_multiple_of(alignment);
        let size = size as usize;
        if offset + size > self.capacity || offset + size > BusAddress::ALIAS_MASK as usize {
            return 0;
        }
        let fill = match flags.init_mode() {
            InitMode::Ones => 0xff,
            InitMode::Zero | InitMode::Uninitialized => 0x00,
        };
        self.memory.resize(offset, 0);
        self.memory.resize(offset + size, fill);

        let handle = self.next_handle;
        self.next_handle += 1;
        self.blocks.insert(
            handle,
            Block {
                offset,
                size,
                locked: false,
            },
        );
        handle
    }

    fn lock(&mut self, handle: u32) -> u32 {
        match self.blocks.get_mut(&handle) {
            Some(block) => {
                block.locked = true;
                BUS_ALIAS | block.offset as u32
            }
            None => 0,
        }
    }

    fn unlock(&mut self, handle: u32) -> u32 {
        match self.blocks.get_mut(&handle) {
            Some(block) if block.locked => {
                block.locked = false;
                0
            }
            _ => 1,
        }
    }

    fn release(&mut self, handle: u32) -> u32 {
        match self.blocks.remove(&handle) {
            Some(_) => 0,
            None => 1,
        }
    }

    fn run(&self, addr: u32, registers: &[u32]) -> Option<u32> {
        let offset = self.offset_of(BusAddress(addr));
        let block = self.locked_block(offset, 2)?;
        let code = &self.memory[block.offset..block.offset + block.size];
        interpret(code, offset - block.offset, registers)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox for Simulator {
    fn exchange(&mut self, msg: &mut Message) -> TransportResult<()> {
        let args = msg.words;
        self.requests.push((msg.tag, args[0]));

        let answer = match Tag::from_u32(msg.tag) {
            Some(Tag::GetFirmwareRevision) => Some(FIRMWARE_REVISION),
            Some(Tag::GetBoardRevision) => Some(BOARD_REVISION),
            Some(Tag::AllocateMemory) => Some(self.allocate(args[0], args[1], args[2])),
            Some(Tag::LockMemory) => Some(self.lock(args[0])),
            Some(Tag::UnlockMemory) => Some(self.unlock(args[0])),
            Some(Tag::ReleaseMemory) => Some(self.release(args[0])),
            Some(Tag::ExecuteCode) => self.run(args[0], &args[1..=EXECUTE_REGISTERS]),
            None => None,
        };

        match answer {
            Some(value) => {
                msg.words[0] = value;
                msg.data_len = RESPONSE_SUCCESS | 4;
                msg.code = RESPONSE_SUCCESS;
            }
            None => msg.code = RESPONSE_PARTIAL,
        }
        trace!(tag = msg.tag, code = msg.code, result = msg.words[0], "simulated firmware answer");
        Ok(())
    }
}

fn interpret(code: &[u8], entry: usize, registers: &[u32]) -> Option<u32> {
    let mut r = [0u32; 16];
    r[..registers.len()].copy_from_slice(registers);
    let mut pc = entry;

    for _ in 0..STEP_LIMIT {
        let bytes = code.get(pc..pc + 2)?;
        let insn = u16::from_le_bytes([bytes[0], bytes[1]]);
        pc += 2;

        match insn {
            RTS => return Some(r[0]),
            NOP => {}
            _ if insn >> 13 == 0b011 => {
                let op = (insn >> 9) & 0xf;
                let imm = u32::from((insn >> 4) & 0x1f);
                let rd = usize::from(insn & 0xf);
                r[rd] = match op {
                    0 => imm,
                    1 => r[rd].wrapping_add(imm),
                    2 => r[rd].wrapping_mul(imm),
                    3 => r[rd].wrapping_sub(imm),
                    _ => return None,
                };
            }
            _ => return None,
        }
    }
    None
}
