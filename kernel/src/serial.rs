//! Serial console driver for debug output, routed through the
//! architecture-specific UART backend.

use core::fmt;
use spin::Mutex;

struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::arch::current::serial::write_bytes(s.as_bytes());
        Ok(())
    }
}

static WRITER: Mutex<SerialWriter> = Mutex::new(SerialWriter);

pub fn init() {
    crate::arch::current::serial::init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    crate::arch::current::interrupts::without_interrupts(|| {
        WRITER
            .lock()
            .write_fmt(args)
            .expect("printing to serial failed");
    });
}

pub fn read_byte() -> Option<u8> {
    crate::arch::current::serial::read_byte()
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}
