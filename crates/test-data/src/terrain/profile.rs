/// Piecewise-constant grade along the ride distance.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeProfile {
    start_elevation_m: f64,
    /// (length in meters, grade in percent)
    sections: Vec<(f64, f64)>,
}

impl GradeProfile {
    pub fn new(start_elevation_m: f64) -> Self {
        Self {
            start_elevation_m,
            sections: Vec::new(),
        }
    }

    /// Appends a section of `length_m` at `grade_pct` (positive climbs).
    pub fn then(mut self, length_m: f64, grade_pct: f64) -> Self {
        self.sections.push((length_m.max(0.0), grade_pct));
        self
    }

    /// Up at `grade_pct` for `length_m`, then back down the same way.
    pub fn out_and_back(start_elevation_m: f64, length_m: f64, grade_pct: f64) -> Self {
        Self::new(start_elevation_m)
            .then(length_m, grade_pct)
            .then(length_m, -grade_pct)
    }

    pub fn length_m(&self) -> f64 {
        self.sections.iter().map(|(len, _)| len).sum()
    }

    /// The last section extends past the end.
    pub fn grade_at(&self, along_m: f64) -> f64 {
        let mut start = 0.0;
        for &(len, grade) in &self.sections {
            if along_m < start + len {
                return grade;
            }
            start += len;
        }
        self.sections.last().map_or(0.0, |&(_, grade)| grade)
    }

    pub fn elevation_at(&self, along_m: f64) -> f64 {
        let mut elevation = self.start_elevation_m;
        let mut start = 0.0;
        for (i, &(len, grade)) in self.sections.iter().enumerate() {
            let last = i + 1 == self.sections.len();
            let covered = if last {
                (along_m - start).max(0.0)
            } else {
                (along_m - start).clamp(0.0, len)
            };
            elevation += covered * grade / 100.0;
            start += len;
            if along_m <= start {
                break;
            }
        }
        elevation
    }

    pub fn total_gain_m(&self) -> f64 {
        self.sections
            .iter()
            .filter(|(_, grade)| *grade > 0.0)
            .map(|(len, grade)| len * grade / 100.0)
            .sum()
    }
}
