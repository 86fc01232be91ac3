//! Navigation packets: presentation control (PCI) and data search (DSI)
//! information carried in private stream 2 once per VOBU.

use crate::utils::errors::DemuxError;
use crate::utils::sector::BinaryCursor;

pub const PCI_SUBSTREAM: u8 = 0x00;
pub const DSI_SUBSTREAM: u8 = 0x01;
pub const MAX_BUTTONS: usize = 36;

/// One highlight button rectangle and its neighbours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonInfo {
    pub color_number: u8,
    pub x_start: u16,
    pub x_end: u16,
    pub auto_action: u8,
    pub y_start: u16,
    pub y_end: u16,
    pub up: u8,
    pub down: u8,
    pub left: u8,
    pub right: u8,
    pub command: [u8; 8],
}

impl ButtonInfo {
    fn parse(cursor: &mut BinaryCursor) -> Result<Self, DemuxError> {
        let b: [u8; 10] = cursor.read_array()?;
        let command = cursor.read_array()?;

        Ok(Self {
            color_number: b[0] >> 6,
            x_start: ((b[0] & 0x3F) as u16) << 4 | (b[1] >> 4) as u16,
            x_end: ((b[1] & 0x03) as u16) << 8 | b[2] as u16,
            auto_action: b[3] >> 6,
            y_start: ((b[3] & 0x3F) as u16) << 4 | (b[4] >> 4) as u16,
            y_end: ((b[4] & 0x03) as u16) << 8 | b[5] as u16,
            up: b[6] & 0x3F,
            down: b[7] & 0x3F,
            left: b[8] & 0x3F,
            right: b[9] & 0x3F,
            command,
        })
    }
}

/// Highlight general information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightInfo {
    pub hli_ss: u16,
    pub hli_s_ptm: u32,
    pub hli_e_ptm: u32,
    pub btn_se_e_ptm: u32,
    pub btn_md: u16,
    pub btn_ofn: u8,
    pub btn_ns: u8,
    pub nsl_btn_ns: u8,
    pub fosl_btnn: u8,
    pub foac_btnn: u8,
    pub btn_coli: [[u32; 2]; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pci {
    pub nv_pck_lbn: u32,
    pub vobu_cat: u16,
    pub vobu_uop_ctl: u32,
    /// VOBU start presentation time, 90 kHz.
    pub vobu_s_ptm: u32,
    /// VOBU end presentation time, 90 kHz.
    pub vobu_e_ptm: u32,
    pub vobu_se_e_ptm: u32,
    pub e_eltm: [u8; 4],
    pub vobu_isrc: [u8; 32],
    pub nsml_agli: [u32; 9],
    pub hli: HighlightInfo,
    pub buttons: [ButtonInfo; MAX_BUTTONS],
}

impl Default for Pci {
    fn default() -> Self {
        Self {
            nv_pck_lbn: 0,
            vobu_cat: 0,
            vobu_uop_ctl: 0,
            vobu_s_ptm: 0,
            vobu_e_ptm: 0,
            vobu_se_e_ptm: 0,
            e_eltm: [0; 4],
            vobu_isrc: [0; 32],
            nsml_agli: [0; 9],
            hli: HighlightInfo::default(),
            buttons: [ButtonInfo::default(); MAX_BUTTONS],
        }
    }
}

impl Pci {
    /// Parses from the byte after the substream id.
    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self, DemuxError> {
        let nv_pck_lbn = cursor.read_u32()?;
        let vobu_cat = cursor.read_u16()?;
        cursor.skip(2)?;
        let vobu_uop_ctl = cursor.read_u32()?;
        let vobu_s_ptm = cursor.read_u32()?;
        let vobu_e_ptm = cursor.read_u32()?;
        let vobu_se_e_ptm = cursor.read_u32()?;
        let e_eltm = cursor.read_array()?;
        let vobu_isrc = cursor.read_array()?;

        let mut nsml_agli = [0u32; 9];
        for angle in nsml_agli.iter_mut() {
            *angle = cursor.read_u32()?;
        }

        let mut hli = HighlightInfo {
            hli_ss: cursor.read_u16()?,
            hli_s_ptm: cursor.read_u32()?,
            hli_e_ptm: cursor.read_u32()?,
            btn_se_e_ptm: cursor.read_u32()?,
            btn_md: cursor.read_u16()?,
            btn_ofn: cursor.read_u8()?,
            btn_ns: cursor.read_u8()?,
            nsl_btn_ns: cursor.read_u8()?,
            ..Default::default()
        };
        cursor.skip(1)?;
        hli.fosl_btnn = cursor.read_u8()?;
        hli.foac_btnn = cursor.read_u8()?;
        for colors in hli.btn_coli.iter_mut() {
            colors[0] = cursor.read_u32()?;
            colors[1] = cursor.read_u32()?;
        }

        let mut buttons = [ButtonInfo::default(); MAX_BUTTONS];
        for button in buttons.iter_mut() {
            *button = ButtonInfo::parse(cursor)?;
        }

        Ok(Self {
            nv_pck_lbn,
            vobu_cat,
            vobu_uop_ctl,
            vobu_s_ptm,
            vobu_e_ptm,
            vobu_se_e_ptm,
            e_eltm,
            vobu_isrc,
            nsml_agli,
            hli,
            buttons,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dsi {
    pub nv_pck_scr: u32,
    pub nv_pck_lbn: u32,
    pub vobu_ea: u32,
    pub vobu_1stref_ea: u32,
    pub vobu_2ndref_ea: u32,
    pub vobu_3rdref_ea: u32,
    pub vobu_vob_idn: u16,
    pub vobu_c_idn: u8,
    pub c_eltm: [u8; 4],
}

impl Dsi {
    /// Parses the general information block from the byte after the
    /// substream id.
    pub fn parse(cursor: &mut BinaryCursor) -> Result<Self, DemuxError> {
        let mut dsi = Self {
            nv_pck_scr: cursor.read_u32()?,
            nv_pck_lbn: cursor.read_u32()?,
            vobu_ea: cursor.read_u32()?,
            vobu_1stref_ea: cursor.read_u32()?,
            vobu_2ndref_ea: cursor.read_u32()?,
            vobu_3rdref_ea: cursor.read_u32()?,
            vobu_vob_idn: cursor.read_u16()?,
            ..Default::default()
        };
        cursor.skip(1)?;
        dsi.vobu_c_idn = cursor.read_u8()?;
        dsi.c_eltm = cursor.read_array()?;
        Ok(dsi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_button_bitfields() -> anyhow::Result<()> {
        // color 2, x 100..700, auto 1, y 50..400, links 1/2/3/4
        let mut data = vec![
            0x80 | (100 >> 4),
            ((100 & 0xF) << 4) as u8 | (700 >> 8) as u8,
            (700 & 0xFF) as u8,
            0x40 | (50 >> 4),
            ((50 & 0xF) << 4) as u8 | (400 >> 8) as u8,
            (400 & 0xFF) as u8,
            0xC1,
            2,
            3,
            4,
        ];
        data.extend_from_slice(&[0x30, 0x02, 0, 0, 0, 0, 0, 0x07]);

        let button = ButtonInfo::parse(&mut BinaryCursor::new(&data))?;
        assert_eq!(button.color_number, 2);
        assert_eq!((button.x_start, button.x_end), (100, 700));
        assert_eq!(button.auto_action, 1);
        assert_eq!((button.y_start, button.y_end), (50, 400));
        assert_eq!(
            (button.up, button.down, button.left, button.right),
            (1, 2, 3, 4)
        );
        assert_eq!(button.command[7], 0x07);
        Ok(())
    }

    #[test]
    fn reads_dsi_cell_identifiers() -> anyhow::Result<()> {
        let mut data = vec![0u8; 24];
        data[3] = 0x10;
        data.extend_from_slice(&[0x00, 0x02, 0x00, 0x05]);
        data.extend_from_slice(&[0x00, 0x00, 0x10, 0x40]);

        let dsi = Dsi::parse(&mut BinaryCursor::new(&data))?;
        assert_eq!(dsi.nv_pck_scr, 0x10);
        assert_eq!(dsi.vobu_vob_idn, 2);
        assert_eq!(dsi.vobu_c_idn, 5);
        assert_eq!(dsi.c_eltm, [0, 0, 0x10, 0x40]);
        Ok(())
    }
}
