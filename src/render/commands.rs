#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pos {
    pub x: f32,
    pub y: f32,
}

impl Pos {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Pos {
        Pos::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open in x: the right edge belongs to the next block.
    pub fn straddles_x(&self, x: f32) -> bool {
        self.x <= x && x < self.right()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(r, g, b, 255)
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self(self.0, self.1, self.2, alpha)
    }
}

/// Drawing surfaces, back to front. Pinned layers are laid out in viewport
/// coordinates and ignore the scroll offset; the others use content
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Template,
    Notes,
    Overlay,
    Keys,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Template, Layer::Notes, Layer::Overlay, Layer::Keys];

    pub fn is_pinned(self) -> bool {
        matches!(self, Layer::Template | Layer::Keys)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        rect: Rect,
        corner_radius: f32,
        fill: Rgba,
        stroke: Option<(f32, Rgba)>,
    },
    Line {
        from: Pos,
        to: Pos,
        width: f32,
        color: Rgba,
    },
    Polyline {
        points: Vec<Pos>,
        width: f32,
        color: Rgba,
    },
    Circle {
        center: Pos,
        radius: f32,
        fill: Rgba,
    },
    Text {
        pos: Pos,
        text: String,
        size: f32,
        color: Rgba,
    },
}
