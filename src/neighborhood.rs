use crate::config::BorderPolicy;
use crate::raster::PixelIndex;

/// One site of a pixel's window: a real pixel or a zero-padding cell outside the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborSite {
    Pixel(usize),
    Padding,
}

impl NeighborSite {
    pub fn pixel(self) -> Option<usize> {
        match self {
            Self::Pixel(i) => Some(i),
            Self::Padding => None,
        }
    }
}

/// Enumerates the `(2r+1)^2 - 1` window sites around a pixel in raster order.
#[derive(Clone, Copy, Debug)]
pub struct NeighborhoodBuilder {
    grid: PixelIndex,
    radius: usize,
    border: BorderPolicy,
}

impl NeighborhoodBuilder {
    pub fn new(grid: PixelIndex, radius: usize, border: BorderPolicy) -> Self {
        Self { grid, radius, border }
    }

    pub fn radius(&self) -> usize { self.radius }
    pub fn border(&self) -> BorderPolicy { self.border }

    /// Window size minus the center.
    pub fn full_size(&self) -> usize {
        let side = 2 * self.radius + 1;
        side * side - 1
    }

    /// True when the whole window of `index` lies inside the image.
    pub fn is_interior(&self, index: usize) -> bool {
        let (x, y) = self.grid.coords(index);
        x >= self.radius
            && y >= self.radius
            && x + self.radius < self.grid.width()
            && y + self.radius < self.grid.height()
    }

    pub fn neighbors(&self, index: usize) -> Vec<NeighborSite> {
        let mut out = Vec::with_capacity(self.full_size());
        self.neighbors_into(index, &mut out);
        out
    }

    /// Same as [`neighbors`](Self::neighbors) but reuses `out`.
    pub fn neighbors_into(&self, index: usize, out: &mut Vec<NeighborSite>) {
        out.clear();
        let (cx, cy) = self.grid.coords(index);
        let r = self.radius as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let x = cx as isize + dx;
                let y = cy as isize + dy;
                if self.grid.contains(x, y) {
                    out.push(NeighborSite::Pixel(self.grid.index(x as usize, y as usize)));
                    continue;
                }
                match self.border {
                    BorderPolicy::Truncate => {}
                    BorderPolicy::ZeroPad => out.push(NeighborSite::Padding),
                    BorderPolicy::Mirror => {
                        let (Some(mx), Some(my)) = (reflect(x, self.grid.width()), reflect(y, self.grid.height())) else {
                            continue;
                        };
                        let mirrored = self.grid.index(mx, my);
                        if mirrored != index {
                            out.push(NeighborSite::Pixel(mirrored));
                        }
                    }
                }
            }
        }
    }
}

// Reflection about the edge without repeating it: -1 -> 1, len -> len - 2.
fn reflect(c: isize, len: usize) -> Option<usize> {
    let len = len as isize;
    let m = if c < 0 {
        -c
    } else if c >= len {
        2 * (len - 1) - c
    } else {
        c
    };
    (0..len).contains(&m).then_some(m as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_skips_the_edge_pixel() {
        assert_eq!(reflect(-1, 5), Some(1));
        assert_eq!(reflect(-2, 5), Some(2));
        assert_eq!(reflect(5, 5), Some(3));
        assert_eq!(reflect(2, 5), Some(2));
        assert_eq!(reflect(-1, 1), None);
    }

    #[test]
    fn interior_pixel_has_full_window() {
        let nb = NeighborhoodBuilder::new(PixelIndex::new(5, 5), 1, BorderPolicy::Truncate);
        let sites = nb.neighbors(12);
        assert_eq!(sites.len(), 8);
        assert!(nb.is_interior(12));
        let expected: Vec<NeighborSite> = [6, 7, 8, 11, 13, 16, 17, 18].iter().map(|&i| NeighborSite::Pixel(i)).collect();
        assert_eq!(sites, expected);
    }

    #[test]
    fn corner_is_truncated() {
        let nb = NeighborhoodBuilder::new(PixelIndex::new(4, 4), 1, BorderPolicy::Truncate);
        assert_eq!(nb.neighbors(0), vec![NeighborSite::Pixel(1), NeighborSite::Pixel(4), NeighborSite::Pixel(5)]);
        assert!(!nb.is_interior(0));
    }

    #[test]
    fn corner_with_zero_pad_keeps_window_size() {
        let nb = NeighborhoodBuilder::new(PixelIndex::new(4, 4), 2, BorderPolicy::ZeroPad);
        let sites = nb.neighbors(0);
        assert_eq!(sites.len(), 24);
        assert_eq!(sites.iter().filter(|s| s.pixel().is_none()).count(), 16);
    }

    #[test]
    fn mirror_never_returns_center() {
        let grid = PixelIndex::new(4, 3);
        let nb = NeighborhoodBuilder::new(grid, 2, BorderPolicy::Mirror);
        for i in 0..grid.len() {
            assert!(nb.neighbors(i).iter().all(|s| *s != NeighborSite::Pixel(i)));
        }
        // corner (0,0) with radius 1 reflects (-1,-1) onto (1,1)
        let nb = NeighborhoodBuilder::new(grid, 1, BorderPolicy::Mirror);
        let sites = nb.neighbors(0);
        assert_eq!(sites.len(), 8);
        assert_eq!(sites[0], NeighborSite::Pixel(grid.index(1, 1)));
    }

    #[test]
    fn single_pixel_image_has_no_neighbors() {
        let nb = NeighborhoodBuilder::new(PixelIndex::new(1, 1), 1, BorderPolicy::Truncate);
        assert!(nb.neighbors(0).is_empty());
    }
}
