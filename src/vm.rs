use crate::image::{Executable, IMAGE_SIZE};

/// Upper bound on executed instructions, so a source-level infinite loop is
/// reported instead of hanging the driver.
const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("unknown opcode {0:#04X} at address {1:#04X}")]
    UnknownOpcode(u8, u8),
    #[error("unknown system call {0}")]
    UnknownSyscall(u8),
    #[error("execution exceeded {0} instructions without halting")]
    StepLimit(usize),
}

/// Reference interpreter for the emitted opcode set: accumulator, X and Y
/// registers, a wrapping 8-bit program counter, and the one flag CPX sets
/// and BNE tests.
pub struct Vm {
    memory: [u8; IMAGE_SIZE],
    acc: u8,
    x: u8,
    y: u8,
    pc: u8,
    zero: bool,
    output: String,
}

impl Vm {
    pub fn new(image: &Executable) -> Self {
        let mut memory = [0u8; IMAGE_SIZE];
        memory.copy_from_slice(image.bytes());
        Self {
            memory,
            acc: 0,
            x: 0,
            y: 0,
            pc: 0,
            zero: false,
            output: String::new(),
        }
    }

    /// Runs the image until HALT, collecting everything it printed.
    pub fn run(mut self) -> Result<String, VmError> {
        for _ in 0..STEP_LIMIT {
            let at = self.pc;
            let opcode = self.fetch();
            match opcode {
                0x00 => return Ok(self.output),
                0xA9 => self.acc = self.fetch(),
                0xAD => {
                    let address = self.fetch_address();
                    self.acc = self.memory[address];
                }
                0x8D => {
                    let address = self.fetch_address();
                    self.memory[address] = self.acc;
                }
                0x6D => {
                    let address = self.fetch_address();
                    self.acc = self.acc.wrapping_add(self.memory[address]);
                }
                0xA2 => self.x = self.fetch(),
                0xAE => {
                    let address = self.fetch_address();
                    self.x = self.memory[address];
                }
                0xA0 => self.y = self.fetch(),
                0xAC => {
                    let address = self.fetch_address();
                    self.y = self.memory[address];
                }
                0xEC => {
                    let address = self.fetch_address();
                    self.zero = self.x == self.memory[address];
                }
                0xD0 => {
                    let offset = self.fetch();
                    if !self.zero {
                        self.pc = self.pc.wrapping_add(offset);
                    }
                }
                0xEA => {}
                0xFF => self.syscall()?,
                other => return Err(VmError::UnknownOpcode(other, at)),
            }
        }
        Err(VmError::StepLimit(STEP_LIMIT))
    }

    fn fetch(&mut self) -> u8 {
        let byte = self.memory[self.pc as usize];
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    // two-byte little-endian operand, truncated to the 256-byte space
    fn fetch_address(&mut self) -> usize {
        let low = self.fetch();
        let high = self.fetch();
        (u16::from_le_bytes([low, high]) as usize) % IMAGE_SIZE
    }

    fn syscall(&mut self) -> Result<(), VmError> {
        match self.x {
            0x01 => {
                self.output.push_str(&self.y.to_string());
                Ok(())
            }
            0x02 => {
                let mut address = self.y as usize;
                while address < IMAGE_SIZE && self.memory[address] != 0 {
                    self.output.push(self.memory[address] as char);
                    address += 1;
                }
                Ok(())
            }
            other => Err(VmError::UnknownSyscall(other)),
        }
    }
}
