/*
 * Copyright (C) 2022-2025 by Christian Fischer
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

//! Scanline rendering for all six video modes, grounded in
//! `original_source`'s `ppu::rendering.cpp`: one scanline of each enabled
//! background layer and the sprite layer are rendered into per-layer
//! buffers, then composited back to front by priority with windowing and
//! the colour special effect applied last.

use super::registers::{ColorEffect, LAYER_BACKDROP, LAYER_OBJ};
use super::{Ppu, DOTS_PER_LINE, FRAMEBUFFER_WIDTH};

#[derive(Debug, Copy, Clone)]
struct Rgb(u8, u8, u8);

#[derive(Debug, Copy, Clone)]
struct LayerPixel {
    color: Rgb,
    priority: u16,
    semi_transparent: bool,
}

pub fn render_scanline(ppu: &mut Ppu) {
    let line = ppu.v_counter;

    if ppu.dispcnt.forced_blank() {
        write_line(ppu, line, &[Rgb(255, 255, 255); DOTS_PER_LINE as usize]);
        return;
    }

    let mode = ppu.dispcnt.bg_mode();
    let mut bg_pixels: [[Option<LayerPixel>; 4]; DOTS_PER_LINE as usize] =
        [[None; 4]; DOTS_PER_LINE as usize];

    match mode {
        0 => {
            for bg in 0..4 {
                if ppu.dispcnt.bg_enabled(bg) {
                    render_text_bg(ppu, bg, line, &mut bg_pixels);
                }
            }
        }
        1 => {
            for bg in 0..2 {
                if ppu.dispcnt.bg_enabled(bg) {
                    render_text_bg(ppu, bg, line, &mut bg_pixels);
                }
            }
            if ppu.dispcnt.bg_enabled(2) {
                render_affine_bg(ppu, 2, &mut bg_pixels);
            }
        }
        2 => {
            for bg in 2..4 {
                if ppu.dispcnt.bg_enabled(bg) {
                    render_affine_bg(ppu, bg, &mut bg_pixels);
                }
            }
        }
        _ => {}
    }

    let bitmap_pixel = match mode {
        3 => Some(render_mode3(ppu, line)),
        4 => Some(render_mode4(ppu, line)),
        5 => Some(render_mode5(ppu, line)),
        _ => None,
    };
    if let Some(row) = &bitmap_pixel {
        if ppu.dispcnt.bg_enabled(2) {
            for x in 0..DOTS_PER_LINE as usize {
                bg_pixels[x][2] = Some(LayerPixel { color: row[x], priority: ppu.bgcnt[2].priority(), semi_transparent: false });
            }
        }
    }

    let obj_pixels = if ppu.dispcnt.obj_enabled() {
        render_objects(ppu, line)
    } else {
        [None; DOTS_PER_LINE as usize]
    };

    composite(ppu, line, &bg_pixels, &obj_pixels);
}

fn write_line(ppu: &mut Ppu, line: u32, pixels: &[Rgb]) {
    let row_start = (line * FRAMEBUFFER_WIDTH * 3) as usize;
    let fb = &mut ppu.framebuffer;
    for (x, p) in pixels.iter().enumerate() {
        let o = row_start + x * 3;
        fb[o] = p.0;
        fb[o + 1] = p.1;
        fb[o + 2] = p.2;
    }
}

fn palette_to_rgb(entry: u16) -> Rgb {
    let r = (entry & 0x1F) as u8;
    let g = ((entry >> 5) & 0x1F) as u8;
    let b = ((entry >> 10) & 0x1F) as u8;
    Rgb((r << 3) | (r >> 2), (g << 3) | (g >> 2), (b << 3) | (b >> 2))
}

fn render_text_bg(ppu: &mut Ppu, bg: usize, line: u32, out: &mut [[Option<LayerPixel>; 4]; 240]) {
    let bgcnt = ppu.bgcnt[bg];
    let priority = bgcnt.priority();
    let (map_w, map_h) = screen_size_tiles(bgcnt.screen_size());
    let y = (line + ppu.bgvofs[bg] as u32) % (map_h * 8);
    let tile_row = y / 8;
    let fine_y = y % 8;
    let screen_base = bgcnt.screen_base_block() as usize * 0x800;
    let char_base = bgcnt.char_base_block() as usize * 0x4000;
    let bpp8 = bgcnt.palette_256();

    for screen_x in 0..DOTS_PER_LINE {
        let x = (screen_x + ppu.bghofs[bg] as u32) % (map_w * 8);
        let tile_col = x / 8;
        let fine_x = x % 8;

        let map_block_x = tile_col / 32;
        let map_block_y = tile_row / 32;
        let block_index = map_block_y * (map_w / 32) + map_block_x;
        let entry_addr = screen_base + block_index as usize * 0x800
            + ((tile_row % 32) * 32 + (tile_col % 32)) as usize * 2;

        let entry = u16::from_le_bytes([ppu.vram_byte(entry_addr), ppu.vram_byte(entry_addr + 1)]);
        let tile_num = entry & 0x3FF;
        let flip_x = entry & (1 << 10) != 0;
        let flip_y = entry & (1 << 11) != 0;
        let palette_num = (entry >> 12) & 0xF;

        let eff_x = if flip_x { 7 - fine_x } else { fine_x };
        let eff_y = if flip_y { 7 - fine_y } else { fine_y };

        let color_index = if bpp8 {
            let tile_addr = char_base + tile_num as usize * 64 + (eff_y * 8 + eff_x) as usize;
            ppu.vram_byte(tile_addr)
        } else {
            let tile_addr = char_base + tile_num as usize * 32 + (eff_y * 4 + eff_x / 2) as usize;
            let byte = ppu.vram_byte(tile_addr);
            if eff_x % 2 == 0 { byte & 0xF } else { byte >> 4 }
        };

        if color_index == 0 {
            continue;
        }

        let palette_index = if bpp8 { color_index as usize } else { (palette_num * 16 + color_index as u16) as usize };
        let rgb = palette_to_rgb(ppu.palette_entry(palette_index));
        out[screen_x as usize][bg] = Some(LayerPixel { color: rgb, priority, semi_transparent: false });
    }
}

fn screen_size_tiles(size: u16) -> (u32, u32) {
    match size {
        0 => (32, 32),
        1 => (64, 32),
        2 => (32, 64),
        _ => (64, 64),
    }
}

/// BG2/BG3 rotate/scale rendering: each scanline samples the affine
/// matrix's current reference point and steps it by (pa, pc) per pixel.
fn render_affine_bg(ppu: &mut Ppu, bg: usize, out: &mut [[Option<LayerPixel>; 4]; 240]) {
    let bgcnt = ppu.bgcnt[bg];
    let priority = bgcnt.priority();
    let affine = ppu.bg_affine[bg - 2];
    let (map_w, map_h) = screen_size_tiles_affine(bgcnt.screen_size());
    let screen_base = bgcnt.screen_base_block() as usize * 0x800;
    let char_base = bgcnt.char_base_block() as usize * 0x4000;
    let wrap = bgcnt.wraparound();

    let pa = super::registers::affine_param_to_f64(affine.pa);
    let pc = super::registers::affine_param_to_f64(affine.pc);
    // internal_x/internal_y are 0.8 fixed-point (same scale as x_ref/y_ref);
    // convert to whole pixels here for the per-pixel sampling below.
    let base_x = affine.internal_x as f64 / 256.0;
    let base_y = affine.internal_y as f64 / 256.0;

    for screen_x in 0..DOTS_PER_LINE {
        let tx = base_x + pa * screen_x as f64;
        let ty = base_y + pc * screen_x as f64;
        let (mut px, mut py) = (tx.floor() as i32, ty.floor() as i32);

        let limit_x = (map_w * 8) as i32;
        let limit_y = (map_h * 8) as i32;
        if wrap {
            px = px.rem_euclid(limit_x);
            py = py.rem_euclid(limit_y);
        } else if px < 0 || py < 0 || px >= limit_x || py >= limit_y {
            continue;
        }

        let tile_col = (px / 8) as u32;
        let tile_row = (py / 8) as u32;
        let fine_x = (px % 8) as u32;
        let fine_y = (py % 8) as u32;

        let entry_addr = screen_base + (tile_row * map_w + tile_col) as usize * 2;
        let entry = u16::from_le_bytes([ppu.vram_byte(entry_addr), ppu.vram_byte(entry_addr + 1)]);
        let tile_num = entry & 0x3FF;

        let tile_addr = char_base + tile_num as usize * 64 + (fine_y * 8 + fine_x) as usize;
        let color_index = ppu.vram_byte(tile_addr);
        if color_index == 0 {
            continue;
        }

        let rgb = palette_to_rgb(ppu.palette_entry(color_index as usize));
        out[screen_x as usize][bg] = Some(LayerPixel { color: rgb, priority, semi_transparent: false });
    }
}

fn screen_size_tiles_affine(size: u16) -> (u32, u32) {
    match size {
        0 => (16, 16),
        1 => (32, 32),
        2 => (64, 64),
        _ => (128, 128),
    }
}

fn render_mode3(ppu: &Ppu, line: u32) -> [Rgb; 240] {
    let mut row = [Rgb(0, 0, 0); 240];
    for x in 0..240u32 {
        let offset = ((line * 240 + x) * 2) as usize;
        let entry = u16::from_le_bytes([ppu.vram_byte(offset), ppu.vram_byte(offset + 1)]);
        row[x as usize] = palette_to_rgb(entry);
    }
    row
}

fn render_mode4(ppu: &Ppu, line: u32) -> [Rgb; 240] {
    let frame_offset = if ppu.dispcnt.display_frame_select() != 0 { 0xA000 } else { 0 };
    let mut row = [Rgb(0, 0, 0); 240];
    for x in 0..240u32 {
        let offset = frame_offset + (line * 240 + x) as usize;
        let index = ppu.vram_byte(offset);
        row[x as usize] = palette_to_rgb(ppu.palette_entry(index as usize));
    }
    row
}

fn render_mode5(ppu: &Ppu, line: u32) -> [Rgb; 240] {
    let frame_offset = if ppu.dispcnt.display_frame_select() != 0 { 0xA000 } else { 0 };
    let mut row = [Rgb(0, 0, 0); 240];
    if line >= 128 {
        return row;
    }
    for x in 0..160u32 {
        let offset = frame_offset + ((line * 160 + x) * 2) as usize;
        let entry = u16::from_le_bytes([ppu.vram_byte(offset), ppu.vram_byte(offset + 1)]);
        row[x as usize] = palette_to_rgb(entry);
    }
    row
}

/// One regular (non-affine) sprite entry read straight out of OAM.
struct ObjAttrs {
    y: u32,
    x: u32,
    width: u32,
    height: u32,
    tile_num: u16,
    priority: u16,
    palette_num: u16,
    bpp8: bool,
    flip_x: bool,
    flip_y: bool,
    semi_transparent: bool,
    disabled: bool,
}

fn read_obj(ppu: &Ppu, index: usize) -> ObjAttrs {
    let base = index * 8;
    let oam = ppu.oam_bytes();
    let attr0 = u16::from_le_bytes([oam[base], oam[base + 1]]);
    let attr1 = u16::from_le_bytes([oam[base + 2], oam[base + 3]]);
    let attr2 = u16::from_le_bytes([oam[base + 4], oam[base + 5]]);

    let shape = (attr0 >> 14) & 0b11;
    let size = (attr1 >> 14) & 0b11;
    let (width, height) = obj_dimensions(shape, size);

    ObjAttrs {
        y: (attr0 & 0xFF) as u32,
        x: (attr1 & 0x1FF) as u32,
        width,
        height,
        tile_num: attr2 & 0x3FF,
        priority: (attr2 >> 10) & 0b11,
        palette_num: (attr2 >> 12) & 0xF,
        bpp8: attr0 & (1 << 13) != 0,
        flip_x: attr1 & (1 << 12) != 0,
        flip_y: attr1 & (1 << 13) != 0,
        semi_transparent: (attr0 >> 10) & 0b11 == 1,
        disabled: (attr0 >> 8) & 0b11 == 2,
    }
}

fn obj_dimensions(shape: u16, size: u16) -> (u32, u32) {
    match (shape, size) {
        (0, 0) => (8, 8), (0, 1) => (16, 16), (0, 2) => (32, 32), (0, 3) => (64, 64),
        (1, 0) => (16, 8), (1, 1) => (32, 8), (1, 2) => (32, 16), (1, 3) => (64, 32),
        (2, 0) => (8, 16), (2, 1) => (8, 32), (2, 2) => (16, 32), (2, 3) => (32, 64),
        _ => (8, 8),
    }
}

fn render_objects(ppu: &Ppu, line: u32) -> [Option<LayerPixel>; 240] {
    let mut out: [Option<LayerPixel>; 240] = [None; 240];
    let one_d_mapping = ppu.dispcnt.obj_char_vram_mapping_1d();
    const OBJ_TILE_BASE: usize = 0x1_0000;

    for index in 0..super::MAX_OBJECTS {
        let obj = read_obj(ppu, index);
        if obj.disabled {
            continue;
        }

        let y0 = obj.y;
        let y1 = (obj.y + obj.height) % 256;
        let on_line = if y1 > y0 { line >= y0 && line < y1 } else { line >= y0 || line < y1 };
        if !on_line {
            continue;
        }

        let row_in_obj = (line + 256 - obj.y) % 256;
        let eff_row = if obj.flip_y { obj.height - 1 - row_in_obj } else { row_in_obj };
        let tiles_wide = obj.width / 8;

        for col in 0..obj.width {
            let screen_x = obj.x + col;
            if screen_x >= DOTS_PER_LINE {
                continue;
            }
            let eff_col = if obj.flip_x { obj.width - 1 - col } else { col };
            let tile_x = eff_col / 8;
            let tile_y = eff_row / 8;
            let fine_x = eff_col % 8;
            let fine_y = eff_row % 8;

            let tile_index = if one_d_mapping {
                obj.tile_num as u32 + tile_y * tiles_wide + tile_x
            } else {
                obj.tile_num as u32 + tile_y * 32 + tile_x
            };

            let color_index = if obj.bpp8 {
                let addr = OBJ_TILE_BASE + tile_index as usize * 64 + (fine_y * 8 + fine_x) as usize;
                ppu.vram_byte(addr)
            } else {
                let addr = OBJ_TILE_BASE + tile_index as usize * 32 + (fine_y * 4 + fine_x / 2) as usize;
                let byte = ppu.vram_byte(addr);
                if fine_x % 2 == 0 { byte & 0xF } else { byte >> 4 }
            };

            if color_index == 0 {
                continue;
            }

            let palette_index = 256 + if obj.bpp8 {
                color_index as usize
            } else {
                (obj.palette_num * 16 + color_index as u16) as usize
            };
            let rgb = palette_to_rgb(ppu.palette_entry(palette_index));

            let existing_priority = out[screen_x as usize].map(|p| p.priority);
            if existing_priority.is_none() || obj.priority < existing_priority.unwrap() {
                out[screen_x as usize] = Some(LayerPixel { color: rgb, priority: obj.priority, semi_transparent: obj.semi_transparent });
            }
        }
    }

    out
}

fn inside_window(x: u32, y: u32, h: (u8, u8), v: (u8, u8)) -> bool {
    let (x1, x2) = (h.0 as u32, if h.1 as u32 > DOTS_PER_LINE || h.1 == 0 { DOTS_PER_LINE } else { h.1 as u32 });
    let (y1, y2) = (v.0 as u32, if v.1 == 0 { 228 } else { v.1 as u32 });
    let x_in = if x2 >= x1 { x >= x1 && x < x2 } else { x >= x1 || x < x2 };
    let y_in = if y2 >= y1 { y >= y1 && y < y2 } else { y >= y1 || y < y2 };
    x_in && y_in
}

fn composite(
    ppu: &mut Ppu,
    line: u32,
    bg_pixels: &[[Option<LayerPixel>; 4]; 240],
    obj_pixels: &[Option<LayerPixel>; 240],
) {
    let windows_active = ppu.dispcnt.window_enabled(0) || ppu.dispcnt.window_enabled(1);
    let backdrop = palette_to_rgb(ppu.palette_entry(0));
    let mut row = [backdrop; 240];

    for x in 0..240u32 {
        let (bg_enable_mask, obj_enable, effects_enable) = if windows_active {
            window_masks_for(ppu, x, line)
        } else {
            (0b1111u16, true, true)
        };

        let mut candidates: [(usize, LayerPixel); 5] = [(
            LAYER_BACKDROP,
            LayerPixel { color: backdrop, priority: 4, semi_transparent: false },
        ); 5];
        let mut count = 0;

        for bg in 0..4 {
            if bg_enable_mask & (1 << bg) == 0 {
                continue;
            }
            if let Some(p) = bg_pixels[x as usize][bg] {
                candidates[count] = (bg, p);
                count += 1;
            }
        }
        if obj_enable {
            if let Some(p) = obj_pixels[x as usize] {
                candidates[count] = (LAYER_OBJ, p);
                count += 1;
            }
        }

        candidates[..count].sort_by_key(|(layer, p)| (p.priority, *layer != LAYER_OBJ));

        let top = candidates[..count].first().copied();
        let second = candidates[..count].get(1).copied();

        let out_color = if let Some((layer, pixel)) = top {
            if effects_enable && ppu.bldcnt.is_1st_target(layer) {
                apply_effect(ppu, pixel, second)
            } else {
                pixel.color
            }
        } else {
            backdrop
        };

        row[x as usize] = out_color;
    }

    write_line(ppu, line, &row);
}

fn window_masks_for(ppu: &Ppu, x: u32, y: u32) -> (u16, bool, bool) {
    if ppu.dispcnt.window_enabled(0) && inside_window(x, y, ppu.win_h[0], ppu.win_v[0]) {
        return (ppu.winin.bg_enable(0), ppu.winin.obj_enable(0), ppu.winin.color_effect(0));
    }
    if ppu.dispcnt.window_enabled(1) && inside_window(x, y, ppu.win_h[1], ppu.win_v[1]) {
        return (ppu.winin.bg_enable(1), ppu.winin.obj_enable(1), ppu.winin.color_effect(1));
    }
    (ppu.winout.outside_bg_enable(), ppu.winout.outside_obj_enable(), ppu.winout.outside_color_effect())
}

fn apply_effect(ppu: &Ppu, top: LayerPixel, second: Option<(usize, LayerPixel)>) -> Rgb {
    let effect = if top.semi_transparent { ColorEffect::AlphaBlend } else { ppu.bldcnt.effect() };
    match effect {
        ColorEffect::None => top.color,
        ColorEffect::AlphaBlend => {
            if let Some((layer, bottom)) = second {
                if ppu.bldcnt.is_2nd_target(layer) || top.semi_transparent {
                    return alpha_blend(top.color, bottom.color, ppu.eva, ppu.evb);
                }
            }
            top.color
        }
        ColorEffect::BrightnessIncrease => brightness_increase(top.color, ppu.evy),
        ColorEffect::BrightnessDecrease => brightness_decrease(top.color, ppu.evy),
    }
}

fn alpha_blend(a: Rgb, b: Rgb, eva: u8, evb: u8) -> Rgb {
    let blend = |ca: u8, cb: u8| -> u8 {
        (((ca as u32 * eva.min(16) as u32) + (cb as u32 * evb.min(16) as u32)) / 16).min(255) as u8
    };
    Rgb(blend(a.0, b.0), blend(a.1, b.1), blend(a.2, b.2))
}

fn brightness_increase(c: Rgb, evy: u8) -> Rgb {
    let f = |v: u8| -> u8 {
        let v = v as u32;
        (v + (255 - v) * evy.min(16) as u32 / 16).min(255) as u8
    };
    Rgb(f(c.0), f(c.1), f(c.2))
}

fn brightness_decrease(c: Rgb, evy: u8) -> Rgb {
    let f = |v: u8| -> u8 {
        let v = v as u32;
        (v - v * evy.min(16) as u32 / 16) as u8
    };
    Rgb(f(c.0), f(c.1), f(c.2))
}
