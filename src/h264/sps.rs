//! H.264 sequence parameter set decoding.
//! See [ITU-T Rec. H.264](https://www.itu.int/rec/T-REC-H.264-201906-I/en)
//! section 7.3.2.1.1 for the `seq_parameter_set_data` grammar and Annex E
//! for the VUI/HRD grammars.

use bitreader::BitReader;
use failure::{bail, Error};

use super::{decode_rbsp, NAL_UNIT_TYPE_SPS};

/// Reads an unsigned Exp-Golomb code (`ue(v)`, section 9.1): `k` leading
/// zero bits, a terminating one bit, then `k` suffix bits `x`, decoding to
/// `(1 << k) + x - 1`.
fn read_golomb_ue(r: &mut BitReader<'_>) -> Result<u32, Error> {
    let mut leading_zeros: u8 = 0;
    while !r.read_bool()? {
        leading_zeros += 1;
        if leading_zeros > 31 {
            bail!("invalid exp-golomb code");
        }
    }
    let mut value = (1u32 << leading_zeros) - 1;
    if leading_zeros > 0 {
        value += r.read_u32(leading_zeros)?;
    }
    Ok(value)
}

/// Reads a signed Exp-Golomb code (`se(v)`, section 9.1.1): the unsigned
/// code `u` maps to 0, +1, -1, +2, -2, ...
fn read_golomb_se(r: &mut BitReader<'_>) -> Result<i32, Error> {
    let value = read_golomb_ue(r)?;
    Ok(match value {
        0 => 0,
        v if v & 1 == 1 => ((v >> 1) + 1) as i32,
        v => -((v >> 1) as i32),
    })
}

/// Reads one `scaling_list` (section 7.3.2.1.1.1), returning the list and
/// the derived `useDefaultScalingMatrixFlag`.
fn read_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<(Vec<i32>, bool), Error> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    let mut list = Vec::with_capacity(size);
    let mut use_default = false;
    for j in 0..size {
        if next_scale != 0 {
            let delta_scale = read_golomb_se(r)?;
            next_scale = (last_scale + delta_scale + 256) % 256;
            use_default = j == 0 && next_scale == 0;
        }
        let scale = if next_scale == 0 { last_scale } else { next_scale };
        list.push(scale);
        last_scale = scale;
    }
    Ok((list, use_default))
}

/// Hypothetical reference decoder parameters, section E.1.2.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HrdParameters {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

impl HrdParameters {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let mut h = HrdParameters::default();
        h.cpb_cnt_minus1 = read_golomb_ue(r)?;
        h.bit_rate_scale = r.read_u8(4)?;
        h.cpb_size_scale = r.read_u8(4)?;
        for _ in 0..=h.cpb_cnt_minus1 {
            h.bit_rate_value_minus1.push(read_golomb_ue(r)?);
            h.cpb_size_value_minus1.push(read_golomb_ue(r)?);
            h.cbr_flag.push(r.read_bool()?);
        }
        h.initial_cpb_removal_delay_length_minus1 = r.read_u8(5)?;
        h.cpb_removal_delay_length_minus1 = r.read_u8(5)?;
        h.dpb_output_delay_length_minus1 = r.read_u8(5)?;
        h.time_offset_length = r.read_u8(5)?;
        Ok(h)
    }
}

/// Sample aspect ratio, section E.1.1. `sar_width`/`sar_height` are only
/// meaningful when `aspect_ratio_idc` is 255 (`Extended_SAR`).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AspectRatioInfo {
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,
}

impl AspectRatioInfo {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let mut a = AspectRatioInfo::default();
        a.aspect_ratio_idc = r.read_u8(8)?;
        if a.aspect_ratio_idc == 255 {
            // Extended_SAR
            a.sar_width = r.read_u16(16)?;
            a.sar_height = r.read_u16(16)?;
        }
        Ok(a)
    }
}

/// Colour description within the video signal type, section E.1.1.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ColourDescription {
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

/// Video signal type, section E.1.1.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VideoSignalType {
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}

impl VideoSignalType {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let mut v = VideoSignalType::default();
        v.video_format = r.read_u8(3)?;
        v.video_full_range_flag = r.read_bool()?;
        if r.read_bool()? {
            v.colour_description = Some(ColourDescription {
                colour_primaries: r.read_u8(8)?,
                transfer_characteristics: r.read_u8(8)?,
                matrix_coefficients: r.read_u8(8)?,
            });
        }
        Ok(v)
    }
}

/// Chroma sample location, section E.1.1.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChromaLocInfo {
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,
}

/// Timing info, section E.1.1. The frame rate is
/// `time_scale / (2 * num_units_in_tick)` for the common
/// progressive-with-fixed-rate case.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
}

impl TimingInfo {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(TimingInfo {
            num_units_in_tick: r.read_u32(32)?,
            time_scale: r.read_u32(32)?,
            fixed_frame_rate_flag: r.read_bool()?,
        })
    }
}

/// Bitstream restriction info, section E.1.1.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BitstreamRestriction {
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

impl BitstreamRestriction {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(BitstreamRestriction {
            motion_vectors_over_pic_boundaries_flag: r.read_bool()?,
            max_bytes_per_pic_denom: read_golomb_ue(r)?,
            max_bits_per_mb_denom: read_golomb_ue(r)?,
            log2_max_mv_length_horizontal: read_golomb_ue(r)?,
            log2_max_mv_length_vertical: read_golomb_ue(r)?,
            max_num_reorder_frames: read_golomb_ue(r)?,
            max_dec_frame_buffering: read_golomb_ue(r)?,
        })
    }
}

/// Video usability information, section E.1.1. Each sub-block's presence
/// is gated by its own flag bit; absence is a first-class `None`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VuiParameters {
    pub aspect_ratio_info: Option<AspectRatioInfo>,
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal_type: Option<VideoSignalType>,
    pub chroma_loc_info: Option<ChromaLocInfo>,
    pub timing_info: Option<TimingInfo>,
    pub nal_hrd_parameters: Option<HrdParameters>,
    pub vcl_hrd_parameters: Option<HrdParameters>,
    pub low_delay_hrd_flag: bool,
    pub pic_struct_present_flag: bool,
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

impl VuiParameters {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let mut v = VuiParameters::default();
        if r.read_bool()? {
            v.aspect_ratio_info = Some(AspectRatioInfo::parse(r)?);
        }
        if r.read_bool()? {
            v.overscan_appropriate_flag = Some(r.read_bool()?);
        }
        if r.read_bool()? {
            v.video_signal_type = Some(VideoSignalType::parse(r)?);
        }
        if r.read_bool()? {
            v.chroma_loc_info = Some(ChromaLocInfo {
                chroma_sample_loc_type_top_field: read_golomb_ue(r)?,
                chroma_sample_loc_type_bottom_field: read_golomb_ue(r)?,
            });
        }
        if r.read_bool()? {
            v.timing_info = Some(TimingInfo::parse(r)?);
        }
        if r.read_bool()? {
            v.nal_hrd_parameters = Some(HrdParameters::parse(r)?);
        }
        if r.read_bool()? {
            v.vcl_hrd_parameters = Some(HrdParameters::parse(r)?);
        }
        if v.nal_hrd_parameters.is_some() || v.vcl_hrd_parameters.is_some() {
            v.low_delay_hrd_flag = r.read_bool()?;
        }
        v.pic_struct_present_flag = r.read_bool()?;
        if r.read_bool()? {
            v.bitstream_restriction = Some(BitstreamRestriction::parse(r)?);
        }
        Ok(v)
    }
}

/// Frame cropping offsets, in crop units as carried in the bitstream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameCropping {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

impl FrameCropping {
    fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(FrameCropping {
            left_offset: read_golomb_ue(r)?,
            right_offset: read_golomb_ue(r)?,
            top_offset: read_golomb_ue(r)?,
            bottom_offset: read_golomb_ue(r)?,
        })
    }
}

/// An H.264 sequence parameter set.
///
/// Every field whose presence is gated by an earlier flag is left at its
/// zero value (or `None`) when absent; a successful [`Sps::parse`] always
/// returns a fully populated tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_set0_flag: bool,
    pub constraint_set1_flag: bool,
    pub constraint_set2_flag: bool,
    pub constraint_set3_flag: bool,
    pub constraint_set4_flag: bool,
    pub constraint_set5_flag: bool,
    pub level_idc: u8,
    pub id: u32,

    // Present only for certain profile_idc values.
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,

    // seq_scaling_list_present_flag == true
    pub scaling_list_4x4: Vec<Vec<i32>>,
    pub use_default_scaling_matrix_4x4_flag: Vec<bool>,
    pub scaling_list_8x8: Vec<Vec<i32>>,
    pub use_default_scaling_matrix_8x8_flag: Vec<bool>,

    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,

    // pic_order_cnt_type == 0
    pub log2_max_pic_order_cnt_lsb_minus4: u32,

    // pic_order_cnt_type == 1
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offsets_for_ref_frames: Vec<i32>,

    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,

    // frame_mbs_only_flag == false
    pub mb_adaptive_frame_field_flag: bool,

    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
    pub vui_parameters: Option<VuiParameters>,
}

impl Sps {
    /// Decodes an SPS from the bytes of a NAL unit (header byte included,
    /// emulation-prevention bytes still in place).
    ///
    /// On any error the whole parse fails; no partial value is returned.
    pub fn parse(nalu: &[u8]) -> Result<Self, Error> {
        let buf = decode_rbsp(nalu);
        if buf.len() < 4 {
            bail!("buffer too short");
        }

        if (buf[0] >> 7) != 0 {
            bail!("wrong forbidden bit");
        }
        if ((buf[0] >> 5) & 0x03) == 0 {
            bail!("wrong nal_ref_idc");
        }
        if (buf[0] & 0x1F) != NAL_UNIT_TYPE_SPS {
            bail!("not a SPS");
        }

        let mut s = Sps::default();
        s.profile_idc = buf[1];
        s.constraint_set0_flag = (buf[2] >> 7) == 1;
        s.constraint_set1_flag = (buf[2] >> 6 & 0x01) == 1;
        s.constraint_set2_flag = (buf[2] >> 5 & 0x01) == 1;
        s.constraint_set3_flag = (buf[2] >> 4 & 0x01) == 1;
        s.constraint_set4_flag = (buf[2] >> 3 & 0x01) == 1;
        s.constraint_set5_flag = (buf[2] >> 2 & 0x01) == 1;
        s.level_idc = buf[3];

        let r = &mut BitReader::new(&buf[4..]);
        s.id = read_golomb_ue(r)?;

        match s.profile_idc {
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135 => {
                s.chroma_format_idc = read_golomb_ue(r)?;
                if s.chroma_format_idc == 3 {
                    s.separate_colour_plane_flag = r.read_bool()?;
                }
                s.bit_depth_luma_minus8 = read_golomb_ue(r)?;
                s.bit_depth_chroma_minus8 = read_golomb_ue(r)?;
                s.qpprime_y_zero_transform_bypass_flag = r.read_bool()?;

                if r.read_bool()? {
                    // seq_scaling_matrix_present_flag
                    let lim = if s.chroma_format_idc != 3 { 8 } else { 12 };
                    for i in 0..lim {
                        if !r.read_bool()? {
                            continue;
                        }
                        if i < 6 {
                            let (list, use_default) = read_scaling_list(r, 16)?;
                            s.scaling_list_4x4.push(list);
                            s.use_default_scaling_matrix_4x4_flag.push(use_default);
                        } else {
                            let (list, use_default) = read_scaling_list(r, 64)?;
                            s.scaling_list_8x8.push(list);
                            s.use_default_scaling_matrix_8x8_flag.push(use_default);
                        }
                    }
                }
            }
            _ => {}
        }

        s.log2_max_frame_num_minus4 = read_golomb_ue(r)?;
        s.pic_order_cnt_type = read_golomb_ue(r)?;
        match s.pic_order_cnt_type {
            0 => s.log2_max_pic_order_cnt_lsb_minus4 = read_golomb_ue(r)?,
            1 => {
                s.delta_pic_order_always_zero_flag = r.read_bool()?;
                s.offset_for_non_ref_pic = read_golomb_se(r)?;
                s.offset_for_top_to_bottom_field = read_golomb_se(r)?;
                let num_ref_frames_in_pic_order_cnt_cycle = read_golomb_ue(r)?;
                for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                    s.offsets_for_ref_frames.push(read_golomb_se(r)?);
                }
            }
            _ => {}
        }

        s.max_num_ref_frames = read_golomb_ue(r)?;
        s.gaps_in_frame_num_value_allowed_flag = r.read_bool()?;
        s.pic_width_in_mbs_minus1 = read_golomb_ue(r)?;
        s.pic_height_in_map_units_minus1 = read_golomb_ue(r)?;
        s.frame_mbs_only_flag = r.read_bool()?;
        if !s.frame_mbs_only_flag {
            s.mb_adaptive_frame_field_flag = r.read_bool()?;
        }
        s.direct_8x8_inference_flag = r.read_bool()?;

        if r.read_bool()? {
            s.frame_cropping = Some(FrameCropping::parse(r)?);
        }
        if r.read_bool()? {
            s.vui_parameters = Some(VuiParameters::parse(r)?);
        }

        Ok(s)
    }

    /// Returns the video width in pixels.
    pub fn width(&self) -> u32 {
        let width = (self.pic_width_in_mbs_minus1 + 1) * 16;
        match self.frame_cropping {
            Some(ref c) => width - (c.left_offset + c.right_offset) * 2,
            None => width,
        }
    }

    /// Returns the video height in pixels.
    pub fn height(&self) -> u32 {
        let f = u32::from(self.frame_mbs_only_flag);
        let height = (2 - f) * (self.pic_height_in_map_units_minus1 + 1) * 16;
        match self.frame_cropping {
            Some(ref c) => height - (c.top_offset + c.bottom_offset) * 2,
            None => height,
        }
    }

    /// Returns the frame rate, or 0 when the SPS carries no timing info.
    pub fn fps(&self) -> f64 {
        let t = match self.vui_parameters.as_ref().and_then(|v| v.timing_info.as_ref()) {
            Some(t) => t,
            None => return 0.0,
        };
        f64::from(t.time_scale) / (2.0 * f64::from(t.num_units_in_tick))
    }
}
