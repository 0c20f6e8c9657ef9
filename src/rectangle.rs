/// Axis aligned box in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Rectangle {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rectangle {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Place a box given in percentages of the page, measured from the top-left
    /// corner, onto the page's media box.
    pub fn from_percentages(page: &Rectangle, x: f64, y: f64, width: f64, height: f64) -> Self {
        let w_pt = width / 100.0 * page.width();
        let h_pt = height / 100.0 * page.height();
        let x1 = page.x1 + x / 100.0 * page.width();
        let y1 = page.y1 + page.height() - y / 100.0 * page.height() - h_pt;
        Self {
            x1,
            y1,
            x2: x1 + w_pt,
            y2: y1 + h_pt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages_flip_the_y_axis() {
        let letter = Rectangle {
            x1: 0.0,
            y1: 0.0,
            x2: 612.0,
            y2: 792.0,
        };
        let rect = Rectangle::from_percentages(&letter, 10.0, 80.0, 30.0, 8.0);
        assert!((rect.x1 - 61.2).abs() < 1e-9);
        assert!((rect.width() - 183.6).abs() < 1e-9);
        assert!((rect.height() - 63.36).abs() < 1e-9);
        // 792 - 633.6 - 63.36
        assert!((rect.y1 - 95.04).abs() < 1e-9);
    }

    #[test]
    fn test_top_left_field_touches_the_top_edge() {
        let page = Rectangle {
            x1: 0.0,
            y1: 0.0,
            x2: 100.0,
            y2: 200.0,
        };
        let rect = Rectangle::from_percentages(&page, 0.0, 0.0, 50.0, 10.0);
        assert_eq!(rect.y2, 200.0);
        assert_eq!(rect.x1, 0.0);
    }
}
