use std::fmt;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use num_traits::FromPrimitive;

use fcs_toolbox_proc_macros::ReadFields;

use crate::errors::DecodeError;

/// A value that can be pulled off a PT3 header in one piece.
///
/// `offset` is the byte position of the reader and is advanced by the number of
/// bytes consumed so errors can point at the failing field.
pub trait ReadField: Sized {
    fn read_field<R: Read>(
        reader: &mut R,
        field: &'static str,
        offset: &mut u64,
    ) -> Result<Self, DecodeError>;
}

fn short_read(field: &'static str, offset: u64, err: std::io::Error) -> DecodeError {
    DecodeError::BadHeader {
        field,
        offset,
        reason: format!("could not read field ({})", err),
    }
}

impl ReadField for u8 {
    fn read_field<R: Read>(
        reader: &mut R,
        field: &'static str,
        offset: &mut u64,
    ) -> Result<Self, DecodeError> {
        let value = reader
            .read_u8()
            .map_err(|e| short_read(field, *offset, e))?;
        *offset += 1;
        Ok(value)
    }
}

impl ReadField for i32 {
    fn read_field<R: Read>(
        reader: &mut R,
        field: &'static str,
        offset: &mut u64,
    ) -> Result<Self, DecodeError> {
        let value = reader
            .read_i32::<LittleEndian>()
            .map_err(|e| short_read(field, *offset, e))?;
        *offset += 4;
        Ok(value)
    }
}

impl ReadField for f32 {
    fn read_field<R: Read>(
        reader: &mut R,
        field: &'static str,
        offset: &mut u64,
    ) -> Result<Self, DecodeError> {
        let value = reader
            .read_f32::<LittleEndian>()
            .map_err(|e| short_read(field, *offset, e))?;
        *offset += 4;
        Ok(value)
    }
}

impl<T: ReadField + Copy + Default, const N: usize> ReadField for [T; N] {
    fn read_field<R: Read>(
        reader: &mut R,
        field: &'static str,
        offset: &mut u64,
    ) -> Result<Self, DecodeError> {
        let mut values = [T::default(); N];
        for value in values.iter_mut() {
            *value = T::read_field(reader, field, offset)?;
        }
        Ok(values)
    }
}

/// Turns a NUL padded ASCII field into a string.
pub fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[derive(FromPrimitive, ToPrimitive, Debug, PartialEq)]
pub enum MeasurementMode {
    T2 = 2,
    T3 = 3,
}

/// ASCII preamble.
#[derive(ReadFields, Debug, Clone, Copy)]
pub struct TextHeader {
    #[wire = "Ident"]
    pub ident: [u8; 16],
    #[wire = "FormatVersion"]
    pub format_version: [u8; 6],
    #[wire = "CreatorName"]
    pub creator_name: [u8; 18],
    #[wire = "CreatorVersion"]
    pub creator_version: [u8; 12],
    #[wire = "FileTime"]
    pub file_time: [u8; 18],
    #[wire = "CRLF"]
    pub crlf: [u8; 2],
    #[wire = "CommentField"]
    pub comment_field: [u8; 256],
}

/// Display settings of one curve, stored as a pair per curve.
#[derive(ReadFields, Debug, Clone, Copy, Default, PartialEq)]
pub struct DispCurve {
    #[wire = "DispCurveMapTo"]
    pub map_to: i32,
    #[wire = "DispCurveShow"]
    pub show: i32,
}

#[derive(ReadFields, Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamTriple {
    #[wire = "ParamStart"]
    pub start: i32,
    #[wire = "ParamStep"]
    pub step: i32,
    #[wire = "ParamEnd"]
    pub end: i32,
}

/// Acquisition settings common to all PicoHarp files.
#[derive(ReadFields, Debug, Clone, Copy)]
pub struct BinaryHeader {
    #[wire = "Curves"]
    pub curves: i32,
    #[wire = "BitsPerRecord"]
    pub bits_per_record: i32,
    #[wire = "RoutingChannels"]
    pub routing_channels: i32,
    #[wire = "NumberOfBoards"]
    pub number_of_boards: i32,
    #[wire = "ActiveCurve"]
    pub active_curve: i32,
    #[wire = "MeasurementMode"]
    pub measurement_mode: i32,
    #[wire = "SubMode"]
    pub sub_mode: i32,
    #[wire = "RangeNo"]
    pub range_no: i32,
    #[wire = "Offset"]
    pub offset: i32,
    #[wire = "AcquisitionTime"]
    pub acquisition_time: i32,
    #[wire = "StopAt"]
    pub stop_at: i32,
    #[wire = "StopOnOvfl"]
    pub stop_on_ovfl: i32,
    #[wire = "Restart"]
    pub restart: i32,
    #[wire = "DispLinLog"]
    pub disp_lin_log: i32,
    #[wire = "DispTimeAxisFrom"]
    pub disp_time_axis_from: i32,
    #[wire = "DispTimeAxisTo"]
    pub disp_time_axis_to: i32,
    #[wire = "DispCountAxisFrom"]
    pub disp_count_axis_from: i32,
    #[wire = "DispCountAxisTo"]
    pub disp_count_axis_to: i32,
    #[wire = "DispCurve"]
    pub disp_curves: [DispCurve; 8],
    #[wire = "Param"]
    pub params: [ParamTriple; 3],
    #[wire = "RepeatMode"]
    pub repeat_mode: i32,
    #[wire = "RepeatsPerCurve"]
    pub repeats_per_curve: i32,
    #[wire = "RepeatTime"]
    pub repeat_time: i32,
    #[wire = "RepeatWaitTime"]
    pub repeat_wait_time: i32,
    #[wire = "ScriptName"]
    pub script_name: [u8; 20],
}

#[derive(ReadFields, Debug, Clone, Copy)]
pub struct BoardHeader {
    #[wire = "HardwareIdent"]
    pub hardware_ident: [u8; 16],
    #[wire = "HardwareVersion"]
    pub hardware_version: [u8; 8],
    #[wire = "HardwareSerial"]
    pub hardware_serial: i32,
    #[wire = "SyncDivider"]
    pub sync_divider: i32,
    #[wire = "CFDZeroCross0"]
    pub cfd_zero_cross0: i32,
    #[wire = "CFDLevel0"]
    pub cfd_level0: i32,
    #[wire = "CFDZeroCross1"]
    pub cfd_zero_cross1: i32,
    #[wire = "CFDLevel1"]
    pub cfd_level1: i32,
    /// Micro-time bin width in nanoseconds.
    #[wire = "Resolution"]
    pub resolution: f32,
}

#[derive(ReadFields, Debug, Clone, Copy, Default, PartialEq)]
pub struct RouterChannel {
    #[wire = "RtChan_InputType"]
    pub input_type: i32,
    #[wire = "RtChan_InputLevel"]
    pub input_level: i32,
    #[wire = "RtChan_InputEdge"]
    pub input_edge: i32,
    #[wire = "RtChan_CFDPresent"]
    pub cfd_present: i32,
    #[wire = "RtChan_CFDLevel"]
    pub cfd_level: i32,
    #[wire = "RtChan_CFDZeroCross"]
    pub cfd_zero_cross: i32,
}

#[derive(ReadFields, Debug, Clone, Copy)]
pub struct RouterHeader {
    #[wire = "RouterModelCode"]
    pub model_code: i32,
    #[wire = "RouterEnabled"]
    pub enabled: i32,
    #[wire = "RtChan"]
    pub channels: [RouterChannel; 4],
}

/// T3 specific settings, closing the fixed part of the header.
#[derive(ReadFields, Debug, Clone, Copy)]
pub struct T3Header {
    #[wire = "ExtDevices"]
    pub ext_devices: i32,
    #[wire = "Reserved1"]
    pub reserved1: i32,
    #[wire = "Reserved2"]
    pub reserved2: i32,
    /// Sync rate in Hz.
    #[wire = "CntRate0"]
    pub cnt_rate0: i32,
    #[wire = "CntRate1"]
    pub cnt_rate1: i32,
    #[wire = "StopAfter"]
    pub stop_after: i32,
    #[wire = "StopReason"]
    pub stop_reason: i32,
    #[wire = "Records"]
    pub records: i32,
    /// Size of the image header in 4 byte words.
    #[wire = "ImgHdrSize"]
    pub img_hdr_size: i32,
}

// Byte positions of validated fields inside their sub-header.
const BITS_PER_RECORD_OFFSET: u64 = 4;
const MEASUREMENT_MODE_OFFSET: u64 = 20;
const RESOLUTION_OFFSET: u64 = 48;
const CNT_RATE0_OFFSET: u64 = 12;
const RECORDS_OFFSET: u64 = 28;
const IMG_HDR_SIZE_OFFSET: u64 = 32;

/// Complete header of a PicoHarp T3 file.
#[derive(Debug, Clone)]
pub struct Pt3Header {
    pub text: TextHeader,
    pub binary: BinaryHeader,
    pub board: BoardHeader,
    pub router: RouterHeader,
    pub t3: T3Header,
    pub img_hdr: Vec<i32>,
    /// Byte position of the first record.
    pub data_offset: u64,
}

impl Pt3Header {
    /// Number of records that follow the header.
    pub fn records(&self) -> usize {
        self.t3.records as usize
    }

    /// Micro-time bin width in nanoseconds.
    pub fn resolution(&self) -> f64 {
        self.board.resolution as f64
    }

    /// Sync rate in Hz.
    pub fn sync_rate(&self) -> f64 {
        self.t3.cnt_rate0 as f64
    }

    /// Sync period in nanoseconds.
    pub fn sync_period(&self) -> f64 {
        1e9 / self.sync_rate()
    }

    pub fn ident(&self) -> String {
        text(&self.text.ident)
    }
}

fn invalid(field: &'static str, offset: u64, reason: String) -> DecodeError {
    DecodeError::BadHeader {
        field,
        offset,
        reason,
    }
}

/// Reads the header, leaving `reader` positioned on the first record.
pub(crate) fn read_pt3_header<R: Read>(reader: &mut R) -> Result<Pt3Header, DecodeError> {
    let mut offset = 0;

    let text_header = TextHeader::read_field(reader, "TextHeader", &mut offset)?;
    let ident = text(&text_header.ident);
    if !ident.starts_with("PicoHarp") {
        warn!("Unexpected file ident {:?}, decoding as PicoHarp T3", ident);
    }

    let binary_start = offset;
    let binary = BinaryHeader::read_field(reader, "BinaryHeader", &mut offset)?;
    if binary.bits_per_record != 32 {
        return Err(invalid(
            "BitsPerRecord",
            binary_start + BITS_PER_RECORD_OFFSET,
            format!("only 32 bit records are supported, got {}", binary.bits_per_record),
        ));
    }
    match FromPrimitive::from_i32(binary.measurement_mode) {
        Some(MeasurementMode::T3) => {}
        Some(MeasurementMode::T2) | None => {
            return Err(invalid(
                "MeasurementMode",
                binary_start + MEASUREMENT_MODE_OFFSET,
                format!("expected T3 mode (3), got {}", binary.measurement_mode),
            ))
        }
    }

    let board_start = offset;
    let board = BoardHeader::read_field(reader, "BoardHeader", &mut offset)?;
    if !(board.resolution > 0.0 && board.resolution.is_finite()) {
        return Err(invalid(
            "Resolution",
            board_start + RESOLUTION_OFFSET,
            format!("must be positive, got {}", board.resolution),
        ));
    }

    let router = RouterHeader::read_field(reader, "RouterHeader", &mut offset)?;

    let t3_start = offset;
    let t3 = T3Header::read_field(reader, "T3Header", &mut offset)?;
    if t3.cnt_rate0 <= 0 {
        return Err(invalid(
            "CntRate0",
            t3_start + CNT_RATE0_OFFSET,
            format!("sync rate must be positive, got {}", t3.cnt_rate0),
        ));
    }
    if t3.records < 0 {
        return Err(invalid(
            "Records",
            t3_start + RECORDS_OFFSET,
            format!("record count must not be negative, got {}", t3.records),
        ));
    }
    if t3.img_hdr_size < 0 {
        return Err(invalid(
            "ImgHdrSize",
            t3_start + IMG_HDR_SIZE_OFFSET,
            format!("must not be negative, got {}", t3.img_hdr_size),
        ));
    }

    let mut img_hdr = Vec::with_capacity(t3.img_hdr_size as usize);
    for _ in 0..t3.img_hdr_size {
        img_hdr.push(i32::read_field(reader, "ImgHdr", &mut offset)?);
    }

    Ok(Pt3Header {
        text: text_header,
        binary,
        board,
        router,
        t3,
        img_hdr,
        data_offset: offset,
    })
}

impl fmt::Display for Pt3Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rows: Vec<(&str, String)> = vec![
            ("Ident", text(&self.text.ident)),
            ("FormatVersion", text(&self.text.format_version)),
            ("CreatorName", text(&self.text.creator_name)),
            ("CreatorVersion", text(&self.text.creator_version)),
            ("FileTime", text(&self.text.file_time)),
            ("Comment", text(&self.text.comment_field)),
            ("MeasurementMode", self.binary.measurement_mode.to_string()),
            ("AcquisitionTime [ms]", self.binary.acquisition_time.to_string()),
            ("HardwareIdent", text(&self.board.hardware_ident)),
            ("HardwareVersion", text(&self.board.hardware_version)),
            ("HardwareSerial", self.board.hardware_serial.to_string()),
            ("SyncDivider", self.board.sync_divider.to_string()),
            ("Resolution [ns]", self.board.resolution.to_string()),
            ("RouterEnabled", self.router.enabled.to_string()),
            ("CntRate0 [Hz]", self.t3.cnt_rate0.to_string()),
            ("CntRate1 [Hz]", self.t3.cnt_rate1.to_string()),
            ("StopReason", self.t3.stop_reason.to_string()),
            ("Records", self.t3.records.to_string()),
            ("ImgHdrSize", self.t3.img_hdr_size.to_string()),
            ("DataOffset", self.data_offset.to_string()),
        ];
        let mut string = String::from("");
        for (key, value) in rows {
            string.push_str(&format!("{:<35}: {}\n", key, value));
        }
        write!(f, "{}", string)
    }
}
