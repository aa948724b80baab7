//! Adapters: concrete implementations of the port traits for a Linux SoC.
//!
//! | Adapter     | Implements             | Connects to                       |
//! |-------------|------------------------|-----------------------------------|
//! | `serial`    | Transport              | UART via serialport               |
//! | `udp`       | Transport              | UDP socket, one frame per datagram|
//! | `zynq`      | SensorPort             | IIO sysmon raw channels           |
//! |             | IdentityPort           | nvmem DNA, netdev MAC, version    |
//! | `eeprom`    | LocationPort           | at24 sysfs EEPROM                 |
//! | `firmware`  | FirmwareStore          | next/current symlinks             |
//! | `journal`   | JournalPort            | journalctl child process          |
//! | `ingest`    | IngestService          | systemctl                         |
//! | `registers` | BoardPort              | mmap of the firmware registers    |
//! | `clock`     | ClockChip              | LMK0461x over spidev              |
//! | `gpio`      | embedded-hal OutputPin | sysfs GPIO                        |
//! | `signal`    | wake source            | SIGINT/SIGTERM via ctrlc          |

pub mod clock;
pub mod eeprom;
pub mod firmware;
pub mod gpio;
pub mod ingest;
pub mod journal;
mod process;
pub mod registers;
pub mod serial;
pub mod signal;
pub mod udp;
pub mod zynq;
