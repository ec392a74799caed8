//! Quantization primitives and bit-level I/O
//!
//! Quantizers map normalized floats onto `N`-bit unsigned integers:
//! - unsigned: `[0, 1]` → `[0, 2^N - 1]`
//! - signed: `[-1, 1]` → `[0, 2^N - 1]` (through `v * 0.5 + 0.5`)
//!
//! Samples are written LSB-first at arbitrary bit offsets, so a run of
//! `3 × N`-bit samples has no per-sample padding.

use glam::Vec4;

// ============================================================================
// Scalar Quantizers
// ============================================================================

#[inline]
fn max_value(num_bits: u8) -> u32 {
    debug_assert!(num_bits > 0 && num_bits < 32, "invalid quantized width {}", num_bits);
    (1u32 << num_bits) - 1
}

/// Quantize a value in `[0, 1]` to `num_bits` bits (round half away from zero)
#[inline]
pub fn pack_scalar_unsigned(value: f32, num_bits: u8) -> u32 {
    let max = max_value(num_bits);
    let clamped = value.clamp(0.0, 1.0);
    ((clamped * max as f32).round() as u32).min(max)
}

#[inline]
pub fn unpack_scalar_unsigned(packed: u32, num_bits: u8) -> f32 {
    let max = max_value(num_bits);
    packed as f32 / max as f32
}

/// Quantize a value in `[-1, 1]` to `num_bits` bits
#[inline]
pub fn pack_scalar_signed(value: f32, num_bits: u8) -> u32 {
    pack_scalar_unsigned(value * 0.5 + 0.5, num_bits)
}

#[inline]
pub fn unpack_scalar_signed(packed: u32, num_bits: u8) -> f32 {
    unpack_scalar_unsigned(packed, num_bits) * 2.0 - 1.0
}

/// Quantize the first three lanes of `value` with per-lane widths
#[inline]
pub fn quantize_vector3(value: Vec4, num_bits: [u8; 3], is_signed: bool) -> [u32; 3] {
    let lanes = value.to_array();
    std::array::from_fn(|i| {
        if is_signed {
            pack_scalar_signed(lanes[i], num_bits[i])
        } else {
            pack_scalar_unsigned(lanes[i], num_bits[i])
        }
    })
}

/// Inverse of [`quantize_vector3`] (W lane is zero)
#[inline]
pub fn dequantize_vector3(packed: [u32; 3], num_bits: [u8; 3], is_signed: bool) -> Vec4 {
    let lanes: [f32; 3] = std::array::from_fn(|i| {
        if is_signed {
            unpack_scalar_signed(packed[i], num_bits[i])
        } else {
            unpack_scalar_unsigned(packed[i], num_bits[i])
        }
    });
    Vec4::new(lanes[0], lanes[1], lanes[2], 0.0)
}

// ============================================================================
// Bit I/O
// ============================================================================

/// Appends values of 1 to 32 bits to a byte buffer
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    current_byte: u8,
    bit_pos: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.data.len() * 8 + self.bit_pos as usize
    }

    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        let mut value = value as u64;
        let mut remaining = count as usize;

        while remaining > 0 {
            let bits_left = 8 - self.bit_pos as usize;
            let bits_to_write = remaining.min(bits_left);

            let mask = (1u64 << bits_to_write) - 1;
            self.current_byte |= ((value & mask) as u8) << self.bit_pos;

            value >>= bits_to_write;
            remaining -= bits_to_write;
            self.bit_pos += bits_to_write as u8;

            if self.bit_pos >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_pos = 0;
            }
        }
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    /// Flushes the partial byte and returns the buffer
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_pos > 0 {
            self.data.push(self.current_byte);
        }
        self.data
    }
}

/// Reads values written by [`BitWriter`]
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at_bit(data, 0)
    }

    /// Reader positioned `bit_offset` bits into `data`
    pub fn at_bit(data: &'a [u8], bit_offset: usize) -> Self {
        Self {
            data,
            byte_pos: bit_offset / 8,
            bit_pos: (bit_offset % 8) as u8,
        }
    }

    pub fn read_bits(&mut self, count: u8) -> u32 {
        debug_assert!(count <= 32);
        let count = count as usize;
        let mut result = 0u64;
        let mut bits_read = 0;

        while bits_read < count {
            assert!(
                self.byte_pos < self.data.len(),
                "read past the end of packed track data"
            );

            let current_byte = self.data[self.byte_pos] as u64;
            let bits_left_in_byte = 8 - self.bit_pos as usize;
            let bits_to_read = (count - bits_read).min(bits_left_in_byte);

            let mask = (1u64 << bits_to_read) - 1;
            let bits = (current_byte >> self.bit_pos) & mask;

            result |= bits << bits_read;
            bits_read += bits_to_read;
            self.bit_pos += bits_to_read as u8;

            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        result as u32
    }

    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_bits(32))
    }
}
