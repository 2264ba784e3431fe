// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{error::Error, f32::consts::PI, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Writes a mono 16-bit WAV holding a quiet 440 Hz tone of the given length.
pub fn write_wav(path: &Path, sample_rate: u32, seconds: f64) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = (sample_rate as f64 * seconds).round() as u64;
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = (2.0 * PI * 440.0 * t).sin() * 0.25;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    Ok(())
}
