//! DAVIS dataset API over COCO-format annotation files.
//!
//! Mirrors the query surface of pycocotools (`getImgIds`, `getCatIds`,
//! `getAnnIds`, `loadAnns`, `annToMask`, `loadRes`) which the evaluator
//! consumes through [`AnnotationSource`].

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::error::Result;
use crate::mask::{self, Mask};
use crate::types::{Annotation, Category, Dataset, Image, Rle, Segmentation};

/// The data-source surface the evaluator needs from ground truth and results.
pub trait AnnotationSource {
    /// All image (frame) ids, ascending.
    fn get_img_ids(&self) -> Vec<u64>;

    /// All category ids, ascending.
    fn get_cat_ids(&self) -> Vec<u64>;

    /// Ids of annotations on the given images and categories. An empty
    /// slice means "no filter" for that dimension.
    fn get_ann_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64>;

    fn load_anns(&self, ids: &[u64]) -> Vec<&Annotation>;

    /// Rasterise an annotation to a dense mask.
    fn ann_to_mask(&self, ann: &Annotation) -> Option<Mask>;
}

/// An indexed DAVIS (COCO-format) dataset.
pub struct DAVIS {
    pub dataset: Dataset,
    /// ann_id -> index into dataset.annotations
    anns: HashMap<u64, usize>,
    /// img_id -> index into dataset.images
    imgs: HashMap<u64, usize>,
    /// cat_id -> index into dataset.categories
    cats: HashMap<u64, usize>,
    /// img_id -> [ann_id, ...]
    img_to_anns: HashMap<u64, Vec<u64>>,
    /// cat_id -> [img_id, ...] (sorted, unique)
    cat_to_imgs: HashMap<u64, Vec<u64>>,
}

impl DAVIS {
    /// Load an annotation JSON file and build indices.
    pub fn new(annotation_file: &Path) -> Result<Self> {
        let file = std::fs::File::open(annotation_file)?;
        let dataset: Dataset = serde_json::from_reader(std::io::BufReader::new(file))?;
        debug!(
            "loaded {:?}: {} images, {} annotations, {} categories",
            annotation_file,
            dataset.images.len(),
            dataset.annotations.len(),
            dataset.categories.len()
        );
        Ok(DAVIS::from_dataset(dataset))
    }

    /// Index an already-loaded dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut davis = DAVIS {
            dataset,
            anns: HashMap::new(),
            imgs: HashMap::new(),
            cats: HashMap::new(),
            img_to_anns: HashMap::new(),
            cat_to_imgs: HashMap::new(),
        };
        davis.create_index();
        davis
    }

    fn create_index(&mut self) {
        for (i, ann) in self.dataset.annotations.iter().enumerate() {
            self.anns.insert(ann.id, i);
            self.img_to_anns
                .entry(ann.image_id)
                .or_default()
                .push(ann.id);
            self.cat_to_imgs
                .entry(ann.category_id)
                .or_default()
                .push(ann.image_id);
        }
        for (i, img) in self.dataset.images.iter().enumerate() {
            self.imgs.insert(img.id, i);
        }
        for (i, cat) in self.dataset.categories.iter().enumerate() {
            self.cats.insert(cat.id, i);
        }
        for ids in self.cat_to_imgs.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    /// Annotation ids on `img_ids` with a category in `cat_ids`.
    ///
    /// Ids come back in `img_ids` order (dataset order when `img_ids` is
    /// empty), so frames stay in playback order whatever their annotation ids.
    pub fn get_ann_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64> {
        let keep = |ann: &Annotation| cat_ids.is_empty() || cat_ids.contains(&ann.category_id);
        if img_ids.is_empty() {
            self.dataset
                .annotations
                .iter()
                .filter(|&ann| keep(ann))
                .map(|ann| ann.id)
                .collect()
        } else {
            img_ids
                .iter()
                .filter_map(|img_id| self.img_to_anns.get(img_id))
                .flatten()
                .filter_map(|id| self.get_ann(*id))
                .filter(|&ann| keep(ann))
                .map(|ann| ann.id)
                .collect()
        }
    }

    /// Category ids filtered by name and/or id, sorted.
    pub fn get_cat_ids(&self, cat_nms: &[&str], cat_ids: &[u64]) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .dataset
            .categories
            .iter()
            .filter(|cat| cat_nms.is_empty() || cat_nms.contains(&cat.name.as_str()))
            .filter(|cat| cat_ids.is_empty() || cat_ids.contains(&cat.id))
            .map(|cat| cat.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Image ids, optionally restricted to images containing any of `cat_ids`.
    pub fn get_img_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64> {
        let mut ids: Vec<u64> = if img_ids.is_empty() {
            self.dataset.images.iter().map(|img| img.id).collect()
        } else {
            img_ids.to_vec()
        };
        if !cat_ids.is_empty() {
            let mut with_cat: Vec<u64> = cat_ids
                .iter()
                .filter_map(|cid| self.cat_to_imgs.get(cid))
                .flatten()
                .copied()
                .collect();
            with_cat.sort_unstable();
            ids.retain(|id| with_cat.binary_search(id).is_ok());
        }
        ids.sort_unstable();
        ids
    }

    pub fn load_anns(&self, ids: &[u64]) -> Vec<&Annotation> {
        ids.iter().filter_map(|&id| self.get_ann(id)).collect()
    }

    pub fn load_cats(&self, ids: &[u64]) -> Vec<&Category> {
        ids.iter()
            .filter_map(|id| self.cats.get(id).map(|&i| &self.dataset.categories[i]))
            .collect()
    }

    pub fn load_imgs(&self, ids: &[u64]) -> Vec<&Image> {
        ids.iter().filter_map(|&id| self.get_img(id)).collect()
    }

    pub fn get_ann(&self, id: u64) -> Option<&Annotation> {
        self.anns.get(&id).map(|&i| &self.dataset.annotations[i])
    }

    pub fn get_img(&self, id: u64) -> Option<&Image> {
        self.imgs.get(&id).map(|&i| &self.dataset.images[i])
    }

    /// Load a result file against this ground truth.
    ///
    /// Accepts either a bare JSON array of annotations or an object with an
    /// `annotations` field. Images and categories are shared with `self`.
    /// Segmentation results get their `area` and missing `bbox` filled from
    /// the mask; box-only results get a rectangle polygon. Ids are assigned
    /// 1-based where absent and `iscrowd` is cleared.
    pub fn load_res(&self, res_file: &Path) -> Result<DAVIS> {
        let text = std::fs::read_to_string(res_file)?;
        let anns: Vec<Annotation> = match serde_json::from_str::<Vec<Annotation>>(&text) {
            Ok(anns) => anns,
            Err(_) => serde_json::from_str::<Dataset>(&text)?.annotations,
        };
        Ok(self.with_results(anns))
    }

    /// Same as [`DAVIS::load_res`] for annotations already in memory.
    pub fn with_results(&self, mut anns: Vec<Annotation>) -> DAVIS {
        for (i, ann) in anns.iter_mut().enumerate() {
            if ann.id == 0 {
                ann.id = (i + 1) as u64;
            }
            ann.iscrowd = false;
            if ann.segmentation.is_some() {
                if let Some(m) = self.ann_to_mask(ann) {
                    ann.area = Some(m.count() as f64);
                    if ann.bbox.is_none() {
                        ann.bbox = Some(m.bbox());
                    }
                }
            } else if let Some([x, y, w, h]) = ann.bbox {
                ann.area = Some(w * h);
                ann.segmentation = Some(Segmentation::Polygon(vec![vec![
                    x,
                    y,
                    x,
                    y + h,
                    x + w,
                    y + h,
                    x + w,
                    y,
                ]]));
            }
        }
        DAVIS::from_dataset(Dataset {
            images: self.dataset.images.clone(),
            annotations: anns,
            categories: self.dataset.categories.clone(),
        })
    }

    /// RLE of an annotation's segmentation; `None` for polygon or box
    /// annotations whose image is unknown, and for malformed compressed counts.
    pub fn ann_to_rle(&self, ann: &Annotation) -> Option<Rle> {
        match &ann.segmentation {
            Some(Segmentation::CompressedRle { size, counts }) => {
                mask::rle_from_string(counts, size[0], size[1])
            }
            Some(Segmentation::UncompressedRle { size, counts }) => Some(Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            }),
            _ => self.ann_to_mask(ann).map(|m| m.to_rle()),
        }
    }

    /// Dense mask of an annotation, falling back to its bbox when there is
    /// no segmentation.
    pub fn ann_to_mask(&self, ann: &Annotation) -> Option<Mask> {
        match &ann.segmentation {
            Some(Segmentation::CompressedRle { size, counts }) => {
                mask::rle_from_string(counts, size[0], size[1]).map(|rle| Mask::from_rle(&rle))
            }
            Some(Segmentation::UncompressedRle { size, counts }) => Some(Mask::from_rle(&Rle {
                h: size[0],
                w: size[1],
                counts: counts.clone(),
            })),
            Some(Segmentation::Polygon(polys)) => {
                let img = self.get_img(ann.image_id)?;
                Some(mask::fr_polys(polys, img.height, img.width))
            }
            None => {
                let img = self.get_img(ann.image_id)?;
                ann.bbox
                    .as_ref()
                    .map(|bb| Mask::from_bbox(bb, img.height, img.width))
            }
        }
    }
}

impl AnnotationSource for DAVIS {
    fn get_img_ids(&self) -> Vec<u64> {
        DAVIS::get_img_ids(self, &[], &[])
    }

    fn get_cat_ids(&self) -> Vec<u64> {
        DAVIS::get_cat_ids(self, &[], &[])
    }

    fn get_ann_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64> {
        DAVIS::get_ann_ids(self, img_ids, cat_ids)
    }

    fn load_anns(&self, ids: &[u64]) -> Vec<&Annotation> {
        DAVIS::load_anns(self, ids)
    }

    fn ann_to_mask(&self, ann: &Annotation) -> Option<Mask> {
        DAVIS::ann_to_mask(self, ann)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> Image {
        Image {
            id,
            file_name: format!("{:05}.jpg", id - 1),
            height: 4,
            width: 4,
        }
    }

    fn ann(id: u64, image_id: u64, category_id: u64, iscrowd: bool) -> Annotation {
        Annotation {
            id,
            image_id,
            category_id,
            bbox: Some([0.0, 0.0, 2.0, 2.0]),
            area: Some(4.0),
            segmentation: None,
            iscrowd,
            score: None,
        }
    }

    fn make_test_dataset() -> Dataset {
        Dataset {
            images: vec![frame(1), frame(2), frame(3)],
            annotations: vec![
                ann(1, 1, 1, false),
                ann(2, 2, 1, false),
                ann(3, 3, 2, true),
                ann(4, 3, 1, false),
            ],
            categories: vec![
                Category {
                    id: 1,
                    name: "bear".into(),
                    supercategory: None,
                },
                Category {
                    id: 2,
                    name: "blackswan".into(),
                    supercategory: None,
                },
            ],
        }
    }

    #[test]
    fn test_create_index() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        assert_eq!(davis.anns.len(), 4);
        assert_eq!(davis.imgs.len(), 3);
        assert_eq!(davis.cats.len(), 2);
    }

    #[test]
    fn test_get_ann_ids_filters() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        assert_eq!(davis.get_ann_ids(&[3], &[]), vec![3, 4]);
        assert_eq!(davis.get_ann_ids(&[], &[1]), vec![1, 2, 4]);
        assert_eq!(davis.get_ann_ids(&[3], &[2]), vec![3]);
        assert_eq!(davis.get_ann_ids(&[], &[]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_get_ann_ids_follows_image_order() {
        let mut ds = make_test_dataset();
        // annotation ids running against frame order
        ds.annotations = vec![ann(1, 3, 1, false), ann(2, 2, 1, false), ann(3, 1, 1, false)];
        let davis = DAVIS::from_dataset(ds);
        assert_eq!(davis.get_ann_ids(&[1, 2, 3], &[]), vec![3, 2, 1]);
        assert_eq!(davis.get_ann_ids(&[3, 1], &[1]), vec![1, 3]);
    }

    #[test]
    fn test_get_cat_and_img_ids() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        assert_eq!(davis.get_cat_ids(&["blackswan"], &[]), vec![2]);
        assert_eq!(davis.get_img_ids(&[], &[2]), vec![3]);
        assert_eq!(davis.get_img_ids(&[], &[]), vec![1, 2, 3]);
    }

    #[test]
    fn test_ann_to_mask_from_bbox() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        let a = davis.get_ann(1).unwrap();
        let m = davis.ann_to_mask(a).unwrap();
        assert_eq!(m.shape(), (4, 4));
        assert_eq!(m.count(), 4);
    }

    #[test]
    fn test_ann_to_mask_unknown_image() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        let orphan = ann(9, 42, 1, false);
        assert!(davis.ann_to_mask(&orphan).is_none());
    }

    #[test]
    fn test_with_results_fills_area_and_bbox() {
        let davis = DAVIS::from_dataset(make_test_dataset());
        let res = Annotation {
            id: 0,
            image_id: 1,
            category_id: 1,
            bbox: None,
            area: None,
            segmentation: Some(Segmentation::UncompressedRle {
                size: [4, 4],
                counts: vec![5, 2, 2, 2, 5],
            }),
            iscrowd: true,
            score: Some(0.9),
        };
        let dt = davis.with_results(vec![res]);
        let a = dt.get_ann(1).unwrap();
        assert_eq!(a.area, Some(4.0));
        assert_eq!(a.bbox, Some([1.0, 1.0, 2.0, 2.0]));
        assert!(!a.iscrowd);
    }
}
