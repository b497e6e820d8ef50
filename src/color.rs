//! RGBA colours exposed to renderers.

/// An RGBA colour with components in `[0, 1]`.
pub type Color = [f32; 4];

pub const WHITE: Color = [1.0, 1.0, 1.0, 1.0];
pub const GRAY: Color = [0.5, 0.5, 0.5, 1.0];
pub const GRAY_BLACK: Color = [0.1, 0.1, 0.1, 1.0];
pub const ORANGE: Color = [1.0, 0.5, 0.0, 1.0];
pub const RED: Color = [1.0, 0.0, 0.0, 1.0];
pub const DK_RED: Color = [0.5, 0.0, 0.0, 1.0];
pub const DK_BLUE: Color = [0.0, 0.0, 0.5, 1.0];
pub const DK_GREEN: Color = [0.0, 0.5, 0.0, 1.0];
pub const GREEN: Color = [0.0, 1.0, 0.0, 1.0];
pub const YELLOW: Color = [1.0, 1.0, 0.0, 1.0];
pub const BROWN: Color = [0.4, 0.2, 0.1, 1.0];
