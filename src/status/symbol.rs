// Status symbols, slots and the packed u32 form sent as a notification
//
// Wire layout: slot i in byte i (slot 0 = low byte). Per byte, the low
// 7 bits are the symbol id and 0x80 is the blink bit.

use core::fmt;

pub const SYMBOL_BLINK: u8 = 0x80;

pub const SLOTS: usize = 4;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Symbol {
    #[default]
    None = 0,
    Ok,
    Fail,
    Progress,
    Hardware,
    Wifi,
    Clock,
    Cloud,
    Sleep,
}

impl Symbol {
    /// Unknown ids decode as [`Symbol::None`].
    pub const fn from_id(id: u8) -> Self {
        match id {
            1 => Symbol::Ok,
            2 => Symbol::Fail,
            3 => Symbol::Progress,
            4 => Symbol::Hardware,
            5 => Symbol::Wifi,
            6 => Symbol::Clock,
            7 => Symbol::Cloud,
            8 => Symbol::Sleep,
            _ => Symbol::None,
        }
    }

    pub const fn id(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Symbol::None => "-",
            Symbol::Ok => "OK",
            Symbol::Fail => "FAIL",
            Symbol::Progress => "PROGRESS",
            Symbol::Hardware => "HW",
            Symbol::Wifi => "WIFI",
            Symbol::Clock => "CLOCK",
            Symbol::Cloud => "CLOUD",
            Symbol::Sleep => "SLEEP",
        };
        f.write_str(name)
    }
}

/// One position on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub symbol: Symbol,
    pub blink: bool,
}

impl Slot {
    pub const EMPTY: Slot = Slot::steady(Symbol::None);

    pub const fn steady(symbol: Symbol) -> Self {
        Self {
            symbol,
            blink: false,
        }
    }

    pub const fn blinking(symbol: Symbol) -> Self {
        Self {
            symbol,
            blink: true,
        }
    }

    pub const fn to_byte(self) -> u8 {
        self.symbol.id() | if self.blink { SYMBOL_BLINK } else { 0 }
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self {
            symbol: Symbol::from_id(byte & !SYMBOL_BLINK),
            blink: byte & SYMBOL_BLINK != 0,
        }
    }

    /// What this slot shows on the given frame. Blinking slots are lit on
    /// even frames only.
    pub fn visible(self, frame: u8) -> Option<Symbol> {
        match self.symbol {
            Symbol::None => None,
            _ if self.blink && frame % 2 != 0 => None,
            s => Some(s),
        }
    }
}

impl From<Symbol> for Slot {
    fn from(symbol: Symbol) -> Self {
        Slot::steady(symbol)
    }
}

/// The four slots as one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Symbols([Slot; SLOTS]);

impl Symbols {
    pub const NONE: Symbols = Symbols([Slot::EMPTY; SLOTS]);

    pub const fn new(slots: [Slot; SLOTS]) -> Self {
        Self(slots)
    }

    /// Fill from the front; missing slots stay empty, extra ones are dropped.
    pub fn from_slots(slots: &[Slot]) -> Self {
        let mut out = Self::NONE;
        for (dst, src) in out.0.iter_mut().zip(slots) {
            *dst = *src;
        }
        out
    }

    pub fn slots(&self) -> &[Slot; SLOTS] {
        &self.0
    }

    pub fn pack(&self) -> u32 {
        self.0
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, slot)| acc | (slot.to_byte() as u32) << (8 * i))
    }

    pub fn unpack(packed: u32) -> Self {
        let mut out = Self::NONE;
        for (i, slot) in out.0.iter_mut().enumerate() {
            *slot = Slot::from_byte((packed >> (8 * i)) as u8);
        }
        out
    }
}

impl fmt::Display for Symbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", slot.symbol)?;
            if slot.blink {
                f.write_str("*")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Brightness {
    Off,
    Dim,
    #[default]
    Normal,
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Brightness::Off => write!(f, "off"),
            Brightness::Dim => write!(f, "dim"),
            Brightness::Normal => write!(f, "normal"),
        }
    }
}

/// One rendered frame as handed to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub brightness: Brightness,
    pub symbols: [Option<Symbol>; SLOTS],
}

impl Frame {
    pub const BLANK: Frame = Frame {
        brightness: Brightness::Off,
        symbols: [None; SLOTS],
    };

    pub fn render(symbols: &Symbols, brightness: Brightness, frame: u8) -> Self {
        let mut out = Frame {
            brightness,
            symbols: [None; SLOTS],
        };
        for (dst, slot) in out.symbols.iter_mut().zip(symbols.slots()) {
            *dst = slot.visible(frame);
        }
        out
    }

    pub fn is_blank(&self) -> bool {
        self.brightness == Brightness::Off || self.symbols.iter().all(Option::is_none)
    }
}
